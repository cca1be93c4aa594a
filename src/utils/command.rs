/// Functions and structs for building and running external tool command lines

use std::path::{Path, PathBuf};
use std::process::Stdio;
use log::{debug, error, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use crate::config::defs::{PipelineError, Platform};


/// One external tool call: what to run and which files it is expected to leave behind.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub tool: String,
    pub program: PathBuf,
    pub args: Vec<String>,
    pub outputs: Vec<PathBuf>,
}

impl ToolInvocation {
    pub fn command_line(&self) -> String {
        let mut line = self.program.to_string_lossy().into_owned();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}


#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    Ran,
    Skipped,
}


/// Launches a tool and waits for it. Returns the exit code, `None` if killed by a signal.
/// An `Err` means the process could not be started at all.
#[allow(async_fn_in_trait)]
pub trait ToolRunner {
    async fn run(&mut self, invocation: &ToolInvocation) -> Result<Option<i32>, PipelineError>;
}


/// Runs tools as child processes, one at a time.
/// Stdout is echoed through the logger when verbose and discarded otherwise; stderr is inherited.
#[derive(Debug, Clone, Default)]
pub struct SubprocessRunner {
    pub verbose: bool,
}

impl SubprocessRunner {
    pub fn new(verbose: bool) -> Self {
        SubprocessRunner { verbose }
    }
}

impl ToolRunner for SubprocessRunner {
    async fn run(&mut self, invocation: &ToolInvocation) -> Result<Option<i32>, PipelineError> {
        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stderr(Stdio::inherit());
        if self.verbose {
            command.stdout(Stdio::piped());
        } else {
            command.stdout(Stdio::null());
        }

        let mut child = command.spawn().map_err(|e| PipelineError::ToolExecution {
            tool: invocation.tool.clone(),
            error: format!("failed to spawn {}: {}", invocation.program.display(), e),
        })?;

        // Echoing is best effort; only the exit status decides the outcome
        if let Some(stdout) = child.stdout.take() {
            let mut reader = BufReader::new(stdout);
            let mut line = Vec::new();
            loop {
                line.clear();
                match reader.read_until(b'\n', &mut line).await {
                    Ok(0) => break,
                    Ok(_) => {
                        let text = String::from_utf8_lossy(&line);
                        info!("[{}] {}", invocation.tool, text.trim_end_matches(['\n', '\r']));
                    }
                    Err(e) => {
                        warn!("Stopped echoing {} output: {}", invocation.tool, e);
                        break;
                    }
                }
            }
        }

        let status = child.wait().await.map_err(|e| PipelineError::ToolExecution {
            tool: invocation.tool.clone(),
            error: e.to_string(),
        })?;
        Ok(status.code())
    }
}


/// True when every declared output is on disk. A stage with no declared outputs is never complete.
pub fn outputs_present(outputs: &[PathBuf]) -> bool {
    !outputs.is_empty() && outputs.iter().all(|path| path.exists())
}


/// Runs one stage unless its outputs already exist.
///
/// # Arguments
///
/// * `runner` - Process launcher.
/// * `invocation` - Command line and declared outputs of the stage.
/// * `overwrite` - Run even when all outputs exist.
///
/// # Returns
/// Whether the tool ran or was skipped; a non-zero exit is a `ToolFailed` error.
pub async fn run_stage<R: ToolRunner>(
    runner: &mut R,
    invocation: &ToolInvocation,
    overwrite: bool,
) -> Result<StageOutcome, PipelineError> {
    if !overwrite && outputs_present(&invocation.outputs) {
        info!("Skipping {}: {} already present", invocation.tool, display_paths(&invocation.outputs));
        return Ok(StageOutcome::Skipped);
    }

    info!("Running {}", invocation.tool);
    debug!("{}", invocation.command_line());

    match runner.run(invocation).await? {
        Some(0) => {
            info!("{} created", display_paths(&invocation.outputs));
            Ok(StageOutcome::Ran)
        }
        code => {
            error!("{} failed: {}", invocation.tool, invocation.command_line());
            Err(PipelineError::ToolFailed { tool: invocation.tool.clone(), code })
        }
    }
}


fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}


/// Native executable path: platform suffix added unless already there, then joined onto `dir`.
pub fn platform_executable(platform: Platform, dir: Option<&Path>, name: &Path) -> PathBuf {
    let suffix = platform.exe_suffix();
    let name = if !suffix.is_empty() && !name.to_string_lossy().to_ascii_lowercase().ends_with(suffix) {
        crate::utils::file::append_to_path(name, suffix)
    } else {
        name.to_path_buf()
    };
    match dir {
        Some(dir) => dir.join(name),
        None => name,
    }
}


/// Puts a script behind an interpreter: (`interpreter`, [`script`, args...]).
/// Without an interpreter the script is run directly.
pub fn wrap_script(interpreter: Option<&Path>, script: &Path, args: Vec<String>) -> (PathBuf, Vec<String>) {
    match interpreter {
        Some(interpreter) => {
            let mut wrapped = Vec::with_capacity(args.len() + 1);
            wrapped.push(script.to_string_lossy().into_owned());
            wrapped.extend(args);
            (interpreter.to_path_buf(), wrapped)
        }
        None => (script.to_path_buf(), args),
    }
}


pub mod flexcat {
    use crate::config::defs::{BARCODE_TRIM_LEFT, FLEXCAT_TAG, PipelineConfig};
    use crate::utils::file::RunPaths;
    use super::{platform_executable, ToolInvocation};

    pub fn arg_generator(config: &PipelineConfig, paths: &RunPaths) -> Vec<String> {
        let trim = &config.trim;
        let mut args_vec: Vec<String> = Vec::new();
        args_vec.push(config.input_file.to_string_lossy().into_owned());

        if !config.exo {
            args_vec.push("-tl".to_string());
            args_vec.push(BARCODE_TRIM_LEFT.to_string());
        }
        args_vec.push("-tt".to_string());
        args_vec.push("-t".to_string());
        if !config.exo {
            args_vec.push("-ss".to_string());
        }
        args_vec.push("-tnum".to_string());
        args_vec.push(config.threads.to_string());
        args_vec.push("-er".to_string());
        args_vec.push(trim.error_rate.to_string());
        args_vec.push("-ol".to_string());
        args_vec.push(trim.overlap.to_string());
        args_vec.push("-fm".to_string());
        args_vec.push(trim.min_overlap.to_string());
        args_vec.push("-ml".to_string());
        args_vec.push(trim.min_length.to_string());
        if !config.exo {
            args_vec.push("-b".to_string());
            args_vec.push(trim.barcodes.to_string_lossy().into_owned());
        }
        args_vec.push("-a".to_string());
        args_vec.push(trim.adapters.to_string_lossy().into_owned());
        if let Some(times) = trim.adapter_times {
            args_vec.push("-times".to_string());
            args_vec.push(times.to_string());
        }
        if let Some(overhang) = trim.adapter_overhang {
            args_vec.push("-oh".to_string());
            args_vec.push(overhang.to_string());
        }
        args_vec.push("-o".to_string());
        args_vec.push(paths.trimmed().to_string_lossy().into_owned());

        args_vec.extend(config.extra_trim_args.iter().cloned());
        args_vec
    }

    pub fn invocation(config: &PipelineConfig, paths: &RunPaths) -> ToolInvocation {
        ToolInvocation {
            tool: FLEXCAT_TAG.to_string(),
            program: platform_executable(config.platform, None, &config.tools.trimmer),
            args: arg_generator(config, paths),
            outputs: paths.trim_outputs(config.exo),
        }
    }
}


/// bowtie and bowtie-build share the location and the Windows wrapper.
pub mod bowtie {
    use std::path::{Path, PathBuf};
    use crate::config::defs::{BOWTIE_BUILD_TAG, BOWTIE_TAG, DEFAULT_EXECUTABLES, PipelineConfig};
    use crate::utils::file::{index_sentinel, RunPaths};
    use super::{platform_executable, wrap_script, ToolInvocation};

    fn program_and_args(config: &PipelineConfig, tag: &str, args: Vec<String>) -> (PathBuf, Vec<String>) {
        let name = Path::new(DEFAULT_EXECUTABLES[tag]);
        let dir = config.tools.bowtie_dir.as_deref();
        if config.platform.wraps_aligner() {
            let script = match dir {
                Some(dir) => dir.join(name),
                None => name.to_path_buf(),
            };
            wrap_script(config.tools.interpreter.as_deref(), &script, args)
        } else {
            (platform_executable(config.platform, dir, name), args)
        }
    }

    pub fn arg_generator(config: &PipelineConfig, paths: &RunPaths, index_prefix: &Path) -> Vec<String> {
        let align = &config.align;
        let mut args_vec: Vec<String> = Vec::new();
        args_vec.push("-S".to_string());
        args_vec.push("-p".to_string());
        args_vec.push(config.threads.to_string());
        args_vec.push("--chunkmbs".to_string());
        args_vec.push(align.chunk_mbs.to_string());
        args_vec.push("-k".to_string());
        args_vec.push(align.max_reported.to_string());
        args_vec.push("-m".to_string());
        args_vec.push(align.max_multimap.to_string());
        args_vec.push("-v".to_string());
        args_vec.push(align.mismatches.to_string());
        args_vec.push("--strata".to_string());
        args_vec.push("--best".to_string());
        args_vec.push(index_prefix.to_string_lossy().into_owned());
        args_vec.push(paths.align_input(config.exo).to_string_lossy().into_owned());
        args_vec.push(paths.aligned().to_string_lossy().into_owned());
        args_vec
    }

    pub fn invocation(config: &PipelineConfig, paths: &RunPaths, index_prefix: &Path) -> ToolInvocation {
        let (program, args) = program_and_args(config, BOWTIE_TAG, arg_generator(config, paths, index_prefix));
        ToolInvocation {
            tool: BOWTIE_TAG.to_string(),
            program,
            args,
            outputs: vec![paths.aligned()],
        }
    }

    pub fn build_invocation(config: &PipelineConfig, index_prefix: &Path) -> ToolInvocation {
        let args_vec = vec![
            config.genome.to_string_lossy().into_owned(),
            index_prefix.to_string_lossy().into_owned(),
        ];
        let (program, args) = program_and_args(config, BOWTIE_BUILD_TAG, args_vec);
        ToolInvocation {
            tool: BOWTIE_BUILD_TAG.to_string(),
            program,
            args,
            outputs: vec![index_sentinel(index_prefix)],
        }
    }
}


pub mod nexus_pre {
    use crate::config::defs::{FILTER_CHROMOSOMES_FLAG, FILTER_RANDOM_SPLIT_FLAG, NEXUS_PRE_TAG, PipelineConfig};
    use crate::utils::file::RunPaths;
    use super::{platform_executable, ToolInvocation};

    pub fn arg_generator(config: &PipelineConfig, paths: &RunPaths) -> Vec<String> {
        let mut args_vec: Vec<String> = Vec::new();
        args_vec.push(paths.aligned().to_string_lossy().into_owned());
        if let Some(chromosomes) = &config.filter_chromosomes {
            args_vec.push(FILTER_CHROMOSOMES_FLAG.to_string());
            args_vec.push(chromosomes.clone());
        }
        if config.random_split {
            args_vec.push(FILTER_RANDOM_SPLIT_FLAG.to_string());
        }
        args_vec
    }

    pub fn invocation(config: &PipelineConfig, paths: &RunPaths) -> ToolInvocation {
        ToolInvocation {
            tool: NEXUS_PRE_TAG.to_string(),
            program: platform_executable(config.platform, None, &config.tools.filter),
            args: arg_generator(config, paths),
            outputs: paths.final_alignments(config.random_split),
        }
    }
}


pub mod bam_indexer {
    use std::path::Path;
    use crate::config::defs::{BAM_INDEXER_TAG, PipelineConfig};
    use crate::utils::file::bam_index_path;
    use super::{wrap_script, ToolInvocation};

    pub fn invocation(config: &PipelineConfig, bam: &Path) -> ToolInvocation {
        let (program, args) = wrap_script(
            config.tools.interpreter.as_deref(),
            &config.tools.indexer,
            vec![bam.to_string_lossy().into_owned()],
        );
        ToolInvocation {
            tool: BAM_INDEXER_TAG.to_string(),
            program,
            args,
            outputs: vec![bam_index_path(bam)],
        }
    }
}
