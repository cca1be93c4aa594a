use std::collections::HashMap;
use std::path::PathBuf;
use lazy_static::lazy_static;
use thiserror::Error;

// External software
pub const FLEXCAT_TAG: &str = "flexcat";
pub const BOWTIE_TAG: &str = "bowtie";
pub const BOWTIE_BUILD_TAG: &str = "bowtie-build";
pub const NEXUS_PRE_TAG: &str = "nexus-pre";
pub const BAM_INDEXER_TAG: &str = "bam_indexer";
pub const PYTHON_TAG: &str = "python";


lazy_static! {
    pub static ref DEFAULT_EXECUTABLES: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert(FLEXCAT_TAG, "flexcat");
        m.insert(BOWTIE_TAG, "bowtie");
        m.insert(BOWTIE_BUILD_TAG, "bowtie-build");
        m.insert(NEXUS_PRE_TAG, "nexus-pre");
        m.insert(BAM_INDEXER_TAG, "bam_indexer.py");
        m.insert(PYTHON_TAG, "python");

        m
    };
}

// Static Filenames
pub const DEFAULT_ADAPTERS: &str = "../data/adapters.fa";
pub const DEFAULT_BARCODES: &str = "../data/barcodes.fa";

// Naming convention for stage outputs: <dir>/<base><suffix><ext>
pub const MATCHED_SUFFIX: &str = "_matched_barcode";
pub const UNIDENTIFIED_SUFFIX: &str = "_unidentified";
pub const FILTERED_SUFFIX: &str = "_filtered";
pub const SPLIT_SUFFIXES: [&str; 2] = ["_filtered_split1", "_filtered_split2"];
pub const SAM_EXT: &str = ".sam";
pub const BAM_EXT: &str = ".bam";
pub const BAI_EXT: &str = ".bai";
pub const EBWT_SENTINEL_EXT: &str = ".1.ebwt";
pub const COMPRESSION_EXTS: &[&'static str] = &["gz", "bz2", "xz", "zst"];

// Static Parameters
pub const TRIM_ERROR_RATE: f64 = 0.2;
pub const TRIM_OVERLAP: u32 = 4;
pub const TRIM_MIN_OVERLAP: u32 = 22;
pub const TRIM_MIN_LENGTH: u32 = 18;
pub const BARCODE_TRIM_LEFT: u32 = 5;

pub const BOWTIE_CHUNK_MBS: u32 = 512;
pub const BOWTIE_MAX_REPORTED: u32 = 1;
pub const BOWTIE_MAX_MULTIMAP: u32 = 1;
pub const BOWTIE_MISMATCHES: u32 = 2;

pub const FILTER_CHROMOSOMES_FLAG: &str = "-fc";
pub const FILTER_RANDOM_SPLIT_FLAG: &str = "-rs";


#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to execute {tool}: {error}")]
    ToolExecution { tool: String, error: String },

    #[error("{tool} exited with {}", describe_exit(.code))]
    ToolFailed { tool: String, code: Option<i32> },

    #[error("I/O error: {0}")]
    IOError(String),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {}", c),
        None => "no status (terminated by signal)".to_string(),
    }
}


/// Host flavours that change how external tools are located and launched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Unix,
    Windows,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Unix
        }
    }

    pub fn exe_suffix(&self) -> &'static str {
        match self {
            Platform::Unix => "",
            Platform::Windows => ".exe",
        }
    }

    /// Bowtie ships as a Python wrapper script on Windows.
    pub fn wraps_aligner(&self) -> bool {
        matches!(self, Platform::Windows)
    }
}


/// Fixed trimmer parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct TrimParams {
    pub error_rate: f64,
    pub overlap: u32,
    pub min_overlap: u32,
    pub min_length: u32,
    pub adapter_times: Option<u32>,
    pub adapter_overhang: Option<u32>,
    pub adapters: PathBuf,
    pub barcodes: PathBuf,
}

impl Default for TrimParams {
    fn default() -> Self {
        TrimParams {
            error_rate: TRIM_ERROR_RATE,
            overlap: TRIM_OVERLAP,
            min_overlap: TRIM_MIN_OVERLAP,
            min_length: TRIM_MIN_LENGTH,
            adapter_times: None,
            adapter_overhang: None,
            adapters: PathBuf::from(DEFAULT_ADAPTERS),
            barcodes: PathBuf::from(DEFAULT_BARCODES),
        }
    }
}


/// Fixed aligner parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignParams {
    pub chunk_mbs: u32,
    pub max_reported: u32,
    pub max_multimap: u32,
    pub mismatches: u32,
}

impl Default for AlignParams {
    fn default() -> Self {
        AlignParams {
            chunk_mbs: BOWTIE_CHUNK_MBS,
            max_reported: BOWTIE_MAX_REPORTED,
            max_multimap: BOWTIE_MAX_MULTIMAP,
            mismatches: BOWTIE_MISMATCHES,
        }
    }
}


/// Locations of the external tools.
/// `bowtie_dir` of `None` means bowtie and bowtie-build are resolved on PATH.
/// `interpreter` wraps the indexer script (and bowtie on Windows).
#[derive(Debug, Clone, PartialEq)]
pub struct ToolPaths {
    pub trimmer: PathBuf,
    pub bowtie_dir: Option<PathBuf>,
    pub filter: PathBuf,
    pub indexer: PathBuf,
    pub interpreter: Option<PathBuf>,
}

impl Default for ToolPaths {
    fn default() -> Self {
        ToolPaths {
            trimmer: PathBuf::from(DEFAULT_EXECUTABLES[FLEXCAT_TAG]),
            bowtie_dir: None,
            filter: PathBuf::from(DEFAULT_EXECUTABLES[NEXUS_PRE_TAG]),
            indexer: PathBuf::from(DEFAULT_EXECUTABLES[BAM_INDEXER_TAG]),
            interpreter: Some(PathBuf::from(DEFAULT_EXECUTABLES[PYTHON_TAG])),
        }
    }
}


/// Everything the driver needs for one run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub input_file: PathBuf,
    pub genome: PathBuf,
    pub output_dir: Option<PathBuf>,
    pub output_base: Option<String>,
    pub index_dir: Option<PathBuf>,
    pub exo: bool,
    pub clean: bool,
    pub overwrite: bool,
    pub verbose: bool,
    pub random_split: bool,
    pub filter_chromosomes: Option<String>,
    pub threads: usize,
    pub extra_trim_args: Vec<String>,
    pub trim: TrimParams,
    pub align: AlignParams,
    pub tools: ToolPaths,
    pub platform: Platform,
}

impl PipelineConfig {
    /// Config with default parameters for the given reads and genome.
    pub fn new(input_file: PathBuf, genome: PathBuf) -> Self {
        PipelineConfig {
            input_file,
            genome,
            output_dir: None,
            output_base: None,
            index_dir: None,
            exo: false,
            clean: false,
            overwrite: false,
            verbose: false,
            random_split: false,
            filter_chromosomes: None,
            threads: 4,
            extra_trim_args: Vec::new(),
            trim: TrimParams::default(),
            align: AlignParams::default(),
            tools: ToolPaths::default(),
            platform: Platform::current(),
        }
    }

    /// Checks the settings that must hold before any stage runs.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.platform == Platform::Windows && self.tools.bowtie_dir.is_none() {
            return Err(PipelineError::InvalidConfig(
                "--bowtie_location is required on Windows".to_string(),
            ));
        }
        if self.platform.wraps_aligner() && self.tools.interpreter.is_none() {
            return Err(PipelineError::InvalidConfig(
                "a Python interpreter is required to run bowtie on Windows".to_string(),
            ));
        }
        if self.threads == 0 {
            return Err(PipelineError::InvalidConfig("--num_threads must be at least 1".to_string()));
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_windows_requires_bowtie_location() {
        let mut config = PipelineConfig::new(PathBuf::from("r.fastq"), PathBuf::from("g.fa"));
        config.platform = Platform::Windows;
        assert!(matches!(config.validate(), Err(PipelineError::InvalidConfig(_))));

        config.tools.bowtie_dir = Some(PathBuf::from("C:/bowtie-1.1.2"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_unix_defaults_validate() {
        let mut config = PipelineConfig::new(PathBuf::from("r.fastq"), PathBuf::from("g.fa"));
        config.platform = Platform::Unix;
        assert!(config.validate().is_ok());

        config.threads = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tool_failed_message() {
        let err = PipelineError::ToolFailed { tool: BOWTIE_TAG.to_string(), code: Some(3) };
        assert_eq!(err.to_string(), "bowtie exited with status 3");
        let err = PipelineError::ToolFailed { tool: BOWTIE_TAG.to_string(), code: None };
        assert!(err.to_string().contains("signal"));
    }
}
