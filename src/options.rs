use bitflags::bitflags;

bitflags! {
    /// Behavioural flags fixed when an archive is opened.
    ///
    /// The bit values match the historical libtar option word, so an integer
    /// handed over from elsewhere converts with `Options::from_bits_truncate`.
    /// None of the flags change entry data; they only affect header validation
    /// and how extraction and listing behave.
    #[derive(Default)]
    pub struct Options: u32 {
        /// Write GNU long name / long link extension entries for names which
        /// do not fit the fixed header fields.
        const GNU = 1;
        /// Print an `ls -l` style line for each entry processed by
        /// `extract_all` and `extract_glob`.
        const VERBOSE = 2;
        /// Refuse to extract onto a path which already exists.
        const NO_OVERWRITE = 4;
        /// Do not treat two zero blocks as the end of the archive; keep reading
        /// until the end of the underlying stream.
        const IGNORE_EOT = 8;
        /// Reject headers whose magic field is not `ustar`.
        const CHECK_MAGIC = 16;
        /// Reject headers whose version field is not `00`.
        const CHECK_VERSION = 32;
        /// Accept headers whose checksum does not match.
        const IGNORE_CRC = 64;
    }
}
