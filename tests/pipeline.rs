#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use anyhow::Result;
use tempfile::{tempdir, TempDir};
use nexus_preprocess::config::defs::{Platform, PipelineConfig, PipelineError};
use nexus_preprocess::pipelines::preprocess::{self, PipelineState};

// Scripts are written then executed; serialise tests so no fork inherits a half-written file.
static TOOL_LOCK: Mutex<()> = Mutex::new(());

const TRIMMER: &str = r#"
out=""; barcodes=0
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift ;;
    -b) barcodes=1 ;;
  esac
  shift
done
if [ $barcodes -eq 1 ]; then
  touch "${out%.*}_matched_barcode.${out##*.}" "${out%.*}_unidentified.${out##*.}"
else
  touch "$out"
fi
echo "trimmed $out""#;

const BOWTIE: &str = r#"
for last; do :; done
touch "$last""#;

const BOWTIE_BUILD: &str = r#"touch "$2.1.ebwt""#;

const FILTER: &str = r#"
sam="$1"
case " $* " in
  *" -rs "*) touch "${sam%.sam}_filtered_split1.bam" "${sam%.sam}_filtered_split2.bam" ;;
  *) touch "${sam%.sam}_filtered.bam" ;;
esac"#;

const INDEXER: &str = r#"touch "$1.bai""#;


struct Workspace {
    tmp: TempDir,
    log: PathBuf,
}

impl Workspace {
    fn new() -> Result<Self> {
        let tmp = tempdir()?;
        fs::create_dir(tmp.path().join("bin"))?;
        fs::write(tmp.path().join("sample.fastq.gz"), b"")?;
        fs::write(tmp.path().join("genome.fa"), b">chr1\nACGT\n")?;
        let log = tmp.path().join("calls.log");
        let ws = Workspace { tmp, log };
        ws.tool("flexcat", TRIMMER)?;
        ws.tool("bowtie", BOWTIE)?;
        ws.tool("bowtie-build", BOWTIE_BUILD)?;
        ws.tool("nexus-pre", FILTER)?;
        ws.tool("bam_indexer.py", INDEXER)?;
        Ok(ws)
    }

    fn bin(&self) -> PathBuf {
        self.tmp.path().join("bin")
    }

    /// Writes an executable shell script that logs its name before running `body`.
    fn tool(&self, name: &str, body: &str) -> Result<PathBuf> {
        let path = self.bin().join(name);
        fs::write(
            &path,
            format!("#!/bin/sh\necho {} >> \"{}\"\n{}\n", name, self.log.display(), body),
        )?;
        let mut perms = fs::metadata(&path)?.permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms)?;
        Ok(path)
    }

    fn config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::new(
            self.tmp.path().join("sample.fastq.gz"),
            self.tmp.path().join("genome.fa"),
        );
        config.platform = Platform::Unix;
        config.threads = 2;
        config.tools.trimmer = self.bin().join("flexcat");
        config.tools.bowtie_dir = Some(self.bin());
        config.tools.filter = self.bin().join("nexus-pre");
        config.tools.indexer = self.bin().join("bam_indexer.py");
        config.tools.interpreter = Some(PathBuf::from("/bin/sh"));
        config
    }

    fn calls(&self) -> Vec<String> {
        fs::read_to_string(&self.log)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    fn reset_calls(&self) {
        let _ = fs::remove_file(&self.log);
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.tmp.path().join(rel)
    }
}


fn exists(path: &Path) -> bool {
    path.exists()
}


#[tokio::test]
async fn test_scenario_then_full_skip() -> Result<()> {
    let _guard = TOOL_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let ws = Workspace::new()?;
    let config = ws.config();

    let report = preprocess::run(&config).await?;
    assert_eq!(report.state, PipelineState::Done);
    assert_eq!(ws.calls(), vec!["flexcat", "bowtie-build", "bowtie", "nexus-pre", "bam_indexer.py"]);
    assert!(exists(&ws.path("sample/sample_matched_barcode.fastq")));
    assert!(exists(&ws.path("sample/sample.sam")));
    assert!(exists(&ws.path("sample/sample_filtered.bam")));
    assert!(exists(&ws.path("sample/sample_filtered.bam.bai")));
    assert!(exists(&ws.path("genome.1.ebwt")));

    ws.reset_calls();
    let report = preprocess::run(&config).await?;
    assert!(ws.calls().is_empty());
    assert!(report.invoked.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_overwrite_with_verbose_output() -> Result<()> {
    let _guard = TOOL_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let ws = Workspace::new()?;
    let mut config = ws.config();
    preprocess::run(&config).await?;

    ws.reset_calls();
    config.overwrite = true;
    config.verbose = true;
    preprocess::run(&config).await?;
    assert_eq!(ws.calls(), vec!["flexcat", "bowtie", "nexus-pre", "bam_indexer.py"]);
    Ok(())
}

#[tokio::test]
async fn test_failing_stage_aborts() -> Result<()> {
    let _guard = TOOL_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let ws = Workspace::new()?;
    ws.tool("bowtie", "exit 3")?;
    let mut config = ws.config();
    config.clean = true;

    let result = preprocess::run(&config).await;
    assert!(matches!(result, Err(PipelineError::ToolFailed { code: Some(3), .. })));
    assert_eq!(ws.calls(), vec!["flexcat", "bowtie-build", "bowtie"]);
    assert!(exists(&ws.path("sample/sample_matched_barcode.fastq")));
    assert!(!exists(&ws.path("sample/sample_filtered.bam")));
    Ok(())
}

#[tokio::test]
async fn test_missing_tool_is_execution_error() -> Result<()> {
    let _guard = TOOL_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let ws = Workspace::new()?;
    let mut config = ws.config();
    config.tools.trimmer = ws.bin().join("no-such-trimmer");

    let result = preprocess::run(&config).await;
    assert!(matches!(result, Err(PipelineError::ToolExecution { .. })));
    assert!(ws.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_exo_random_split_clean() -> Result<()> {
    let _guard = TOOL_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let ws = Workspace::new()?;
    let mut config = ws.config();
    config.exo = true;
    config.random_split = true;
    config.clean = true;
    config.filter_chromosomes = Some("chrM".to_string());

    let report = preprocess::run(&config).await?;
    assert_eq!(
        ws.calls(),
        vec!["flexcat", "bowtie-build", "bowtie", "nexus-pre", "bam_indexer.py", "bam_indexer.py"]
    );
    assert_eq!(report.removed, vec![ws.path("sample/sample.fastq"), ws.path("sample/sample.sam")]);
    for half in ["sample/sample_filtered_split1.bam", "sample/sample_filtered_split2.bam"] {
        assert!(exists(&ws.path(half)));
        assert!(exists(&ws.path(&format!("{}.bai", half))));
    }
    Ok(())
}

#[tokio::test]
async fn test_verbose_binary_stdout_is_not_a_failure() -> Result<()> {
    let _guard = TOOL_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    let ws = Workspace::new()?;
    ws.tool("bam_indexer.py", &format!("printf '\\377\\376\\n'\n{}", INDEXER))?;
    let mut config = ws.config();
    config.verbose = true;

    let report = preprocess::run(&config).await?;
    assert_eq!(report.state, PipelineState::Done);
    assert!(exists(&ws.path("sample/sample_filtered.bam.bai")));
    Ok(())
}
