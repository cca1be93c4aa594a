use std::path::PathBuf;
use clap::Parser;
use crate::config::defs::{
    AlignParams, PipelineConfig, Platform, ToolPaths, TrimParams, DEFAULT_ADAPTERS, DEFAULT_BARCODES,
    DEFAULT_EXECUTABLES, BAM_INDEXER_TAG, FLEXCAT_TAG, NEXUS_PRE_TAG, PYTHON_TAG, TRIM_ERROR_RATE,
    TRIM_MIN_LENGTH, TRIM_MIN_OVERLAP, TRIM_OVERLAP,
};
use crate::utils::system::detect_threads;

#[derive(Parser, Debug, Clone, Default)]
#[command(name = "nexus-preprocess", version, about = "Preprocess fastq files and do mapping")]
pub struct Arguments {

    /// Raw reads, plain or compressed
    pub input_file: PathBuf,

    /// Reference genome FASTA
    pub genome: PathBuf,

    #[arg(long, help = "Trim for the exo protocol: adapters only, no barcode demultiplexing")]
    pub exo: bool,

    #[arg(long, help = "Delete intermediate files after a successful run")]
    pub clean: bool,

    #[arg(long, help = "Re-run stages whose outputs already exist (the genome index is never rebuilt)")]
    pub overwrite: bool,

    #[arg(short = 'v', long = "verbose", action)]
    pub verbose: bool,

    #[arg(long = "bowtie_location", help = "Directory holding bowtie and bowtie-build. Required on Windows; otherwise PATH is used.")]
    pub bowtie_location: Option<PathBuf>,

    #[arg(long = "num_threads", help = "Threads for the trimmer and aligner; defaults to the physical core count")]
    pub num_threads: Option<usize>,

    #[arg(long = "output_dir", help = "Working directory for all generated files. Defaults to '<input dir>/<input base>'.")]
    pub output_dir: Option<PathBuf>,

    #[arg(long = "output", help = "Base name for generated files instead of the input's")]
    pub output: Option<String>,

    #[arg(long = "index_dir", help = "Directory for the bowtie index; defaults to the genome's directory")]
    pub index_dir: Option<PathBuf>,

    #[arg(long = "filter_chromosomes", help = "Chromosome list handed to nexus-pre")]
    pub filter_chromosomes: Option<String>,

    #[arg(long = "random_split", help = "Split the filtered alignment into two random halves")]
    pub random_split: bool,

    #[arg(long, default_value = DEFAULT_ADAPTERS)]
    pub adapters: PathBuf,

    #[arg(long, default_value = DEFAULT_BARCODES)]
    pub barcodes: PathBuf,

    #[arg(long = "flexcat_times")]
    pub flexcat_times: Option<u32>,

    #[arg(long = "flexcat_oh")]
    pub flexcat_oh: Option<u32>,

    #[arg(long = "trim_error_rate", default_value_t = TRIM_ERROR_RATE)]
    pub trim_error_rate: f64,

    #[arg(long = "trim_overlap", default_value_t = TRIM_OVERLAP)]
    pub trim_overlap: u32,

    #[arg(long = "trim_min_overlap", default_value_t = TRIM_MIN_OVERLAP)]
    pub trim_min_overlap: u32,

    #[arg(long = "trim_min_length", default_value_t = TRIM_MIN_LENGTH)]
    pub trim_min_length: u32,

    #[arg(long, default_value = DEFAULT_EXECUTABLES[FLEXCAT_TAG])]
    pub trimmer: PathBuf,

    #[arg(long, default_value = DEFAULT_EXECUTABLES[NEXUS_PRE_TAG])]
    pub filter: PathBuf,

    #[arg(long, default_value = DEFAULT_EXECUTABLES[BAM_INDEXER_TAG])]
    pub indexer: PathBuf,

    #[arg(long, default_value = DEFAULT_EXECUTABLES[PYTHON_TAG])]
    pub python: PathBuf,

    /// Extra arguments passed straight to the trimmer, after `--`
    #[arg(last = true)]
    pub extra_trim_args: Vec<String>,
}

impl Arguments {
    /// Builds the driver configuration for the host platform.
    pub fn to_config(&self) -> PipelineConfig {
        PipelineConfig {
            input_file: self.input_file.clone(),
            genome: self.genome.clone(),
            output_dir: self.output_dir.clone(),
            output_base: self.output.clone(),
            index_dir: self.index_dir.clone(),
            exo: self.exo,
            clean: self.clean,
            overwrite: self.overwrite,
            verbose: self.verbose,
            random_split: self.random_split,
            filter_chromosomes: self.filter_chromosomes.clone(),
            threads: detect_threads(self.num_threads),
            extra_trim_args: self.extra_trim_args.clone(),
            trim: TrimParams {
                error_rate: self.trim_error_rate,
                overlap: self.trim_overlap,
                min_overlap: self.trim_min_overlap,
                min_length: self.trim_min_length,
                adapter_times: self.flexcat_times,
                adapter_overhang: self.flexcat_oh,
                adapters: self.adapters.clone(),
                barcodes: self.barcodes.clone(),
            },
            align: AlignParams::default(),
            tools: ToolPaths {
                trimmer: self.trimmer.clone(),
                bowtie_dir: self.bowtie_location.clone(),
                filter: self.filter.clone(),
                indexer: self.indexer.clone(),
                interpreter: Some(self.python.clone()),
            },
            platform: Platform::current(),
        }
    }
}
