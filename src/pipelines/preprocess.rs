use std::fs;
use std::io;
use std::path::PathBuf;
use log::{debug, info, warn};
use crate::config::defs::{PipelineConfig, PipelineError};
use crate::utils::command::{bam_indexer, bowtie, flexcat, nexus_pre, run_stage, StageOutcome, SubprocessRunner, ToolInvocation, ToolRunner};
use crate::utils::file::{index_prefix, same_location, RunPaths};


/// Driver states, visited strictly in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    #[default]
    Start,
    Trimmed,
    IndexReady,
    Aligned,
    Filtered,
    Indexed,
    Cleaned,
    Done,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }
}


/// What a run did: tools launched and skipped, in order, and files removed by cleanup.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub state: PipelineState,
    pub invoked: Vec<String>,
    pub skipped: Vec<String>,
    pub removed: Vec<PathBuf>,
}


pub struct Pipeline<'a, R: ToolRunner> {
    config: &'a PipelineConfig,
    paths: RunPaths,
    index_prefix: PathBuf,
    runner: R,
    report: RunReport,
}

impl<'a, R: ToolRunner> Pipeline<'a, R> {
    /// Validates the config and resolves every artifact path. Nothing touches the disk yet.
    pub fn new(config: &'a PipelineConfig, runner: R) -> Result<Self, PipelineError> {
        config.validate()?;
        let paths = RunPaths::resolve(
            &config.input_file,
            config.output_dir.as_deref(),
            config.output_base.as_deref(),
        );
        // Raw reads are never a stage output: they would be skipped over, overwritten or cleaned away
        if let Some(clash) = paths
            .all_outputs(config.exo, config.random_split)
            .into_iter()
            .find(|output| same_location(output, &config.input_file))
        {
            return Err(PipelineError::InvalidConfig(format!(
                "output {} would replace the input reads; choose another --output_dir or --output",
                clash.display()
            )));
        }
        let index_prefix = index_prefix(&config.genome, config.index_dir.as_deref());
        Ok(Pipeline {
            config,
            paths,
            index_prefix,
            runner,
            report: RunReport::default(),
        })
    }

    pub fn paths(&self) -> &RunPaths {
        &self.paths
    }

    pub fn state(&self) -> PipelineState {
        self.report.state
    }

    pub fn report(&self) -> &RunReport {
        &self.report
    }

    pub fn into_runner(self) -> R {
        self.runner
    }

    /// Drives the pipeline to `Done`, or to `Failed` on the first error.
    /// Artifacts produced before a failure are left in place.
    pub async fn run(&mut self) -> Result<(), PipelineError> {
        while !self.report.state.is_terminal() {
            match self.step().await {
                Ok(next) => {
                    debug!("{:?} -> {:?}", self.report.state, next);
                    self.report.state = next;
                }
                Err(e) => {
                    self.report.state = PipelineState::Failed;
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    async fn step(&mut self) -> Result<PipelineState, PipelineError> {
        let next = match self.report.state {
            PipelineState::Start => {
                self.paths.ensure_dir().map_err(|e| {
                    PipelineError::IOError(format!("Failed to create {}: {}", self.paths.work_dir.display(), e))
                })?;
                let trim = flexcat::invocation(self.config, &self.paths);
                self.stage(&trim, self.config.overwrite).await?;
                PipelineState::Trimmed
            }
            PipelineState::Trimmed => {
                // An existing index is never rebuilt, overwrite or not
                let build = bowtie::build_invocation(self.config, &self.index_prefix);
                self.stage(&build, false).await?;
                PipelineState::IndexReady
            }
            PipelineState::IndexReady => {
                let align = bowtie::invocation(self.config, &self.paths, &self.index_prefix);
                self.stage(&align, self.config.overwrite).await?;
                PipelineState::Aligned
            }
            PipelineState::Aligned => {
                let filter = nexus_pre::invocation(self.config, &self.paths);
                self.stage(&filter, self.config.overwrite).await?;
                PipelineState::Filtered
            }
            PipelineState::Filtered => {
                for bam in self.paths.final_alignments(self.config.random_split) {
                    let index = bam_indexer::invocation(self.config, &bam);
                    self.stage(&index, self.config.overwrite).await?;
                }
                PipelineState::Indexed
            }
            PipelineState::Indexed if self.config.clean => {
                self.clean()?;
                PipelineState::Cleaned
            }
            PipelineState::Indexed | PipelineState::Cleaned => PipelineState::Done,
            state @ (PipelineState::Done | PipelineState::Failed) => state,
        };
        Ok(next)
    }

    async fn stage(&mut self, invocation: &ToolInvocation, overwrite: bool) -> Result<(), PipelineError> {
        match run_stage(&mut self.runner, invocation, overwrite).await? {
            StageOutcome::Ran => self.report.invoked.push(invocation.tool.clone()),
            StageOutcome::Skipped => self.report.skipped.push(invocation.tool.clone()),
        }
        Ok(())
    }

    fn clean(&mut self) -> Result<(), PipelineError> {
        for path in self.paths.intermediates(self.config.exo, self.config.random_split) {
            match fs::remove_file(&path) {
                Ok(()) => {
                    info!("Removed {}", path.display());
                    self.report.removed.push(path);
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    warn!("{} not found; nothing to remove", path.display());
                }
                Err(e) => {
                    return Err(PipelineError::IOError(format!("Failed to remove {}: {}", path.display(), e)));
                }
            }
        }
        Ok(())
    }
}


/// Run function for the preprocessing pipeline using real subprocesses
///
/// # Arguments
///
/// * `config` - PipelineConfig built from the command line.
///
/// # Returns
/// Result<RunReport, PipelineError>
pub async fn run(config: &PipelineConfig) -> Result<RunReport, PipelineError> {
    let mut pipeline = Pipeline::new(config, SubprocessRunner::new(config.verbose))?;
    info!("Working directory: {}", pipeline.paths().work_dir.display());

    pipeline.run().await?;

    let report = pipeline.report().clone();
    info!(
        "Finished preprocessing: {} tool(s) run, {} skipped",
        report.invoked.len(),
        report.skipped.len()
    );
    Ok(report)
}
