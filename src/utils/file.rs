use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use crate::config::defs::{
    BAI_EXT, BAM_EXT, COMPRESSION_EXTS, EBWT_SENTINEL_EXT, FILTERED_SUFFIX, MATCHED_SUFFIX,
    SAM_EXT, SPLIT_SUFFIXES, UNIDENTIFIED_SUFFIX,
};


/// Splits a read filename into its base name and the extension used for output naming.
/// A trailing compression suffix is dropped first, so `sample.fastq.gz` gives
/// `("sample", ".fastq")`. A name with no extension gives an empty extension.
///
/// # Arguments
///
/// * `path` - Path to the reads; only the final component is inspected.
///
/// # Returns
/// (base, ext) with `ext` including its leading dot.
pub fn split_read_name(path: &Path) -> (String, String) {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut stem = file_name.as_str();
    if let Some((head, tail)) = stem.rsplit_once('.') {
        if !head.is_empty() && COMPRESSION_EXTS.iter().any(|ext| ext.eq_ignore_ascii_case(tail)) {
            stem = head;
        }
    }

    match stem.rsplit_once('.') {
        Some((head, tail)) if !head.is_empty() => (head.to_string(), format!(".{}", tail)),
        _ => (stem.to_string(), String::new()),
    }
}


/// Appends a literal suffix to the whole path, e.g. `x.bam` -> `x.bam.bai`.
pub fn append_to_path(path: &Path, suffix: &str) -> PathBuf {
    let mut raw: OsString = path.as_os_str().to_owned();
    raw.push(suffix);
    PathBuf::from(raw)
}


/// Companion index path of a BAM file.
pub fn bam_index_path(bam: &Path) -> PathBuf {
    append_to_path(bam, BAI_EXT)
}


/// Bowtie index prefix for a genome: `<index_dir or genome dir>/<genome stem>`.
pub fn index_prefix(genome: &Path, index_dir: Option<&Path>) -> PathBuf {
    let (stem, _) = split_read_name(genome);
    let dir = match index_dir {
        Some(dir) => dir.to_path_buf(),
        None => genome.parent().map(Path::to_path_buf).unwrap_or_default(),
    };
    dir.join(stem)
}


/// The file whose presence marks a built index.
pub fn index_sentinel(prefix: &Path) -> PathBuf {
    append_to_path(prefix, EBWT_SENTINEL_EXT)
}


/// Absolute form of `path` with its directory resolved through symlinks when it exists.
fn normalize(path: &Path) -> PathBuf {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    match (fs::canonicalize(dir), path.file_name()) {
        (Ok(dir), Some(name)) => dir.join(name),
        _ => std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf()),
    }
}


/// True when both paths name the same file location, whether or not it exists.
pub fn same_location(a: &Path, b: &Path) -> bool {
    normalize(a) == normalize(b)
}


/// All artifact paths of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunPaths {
    pub work_dir: PathBuf,
    pub base: String,
    pub read_ext: String,
}

impl RunPaths {
    /// Derives the working directory and naming base for a run. Pure; see `ensure_dir`.
    ///
    /// # Arguments
    ///
    /// * `input` - Raw reads path.
    /// * `output_dir` - Explicit working directory; defaults to `<input dir>/<input base>`.
    /// * `base_override` - Explicit base name; its own extension is ignored.
    pub fn resolve(input: &Path, output_dir: Option<&Path>, base_override: Option<&str>) -> Self {
        let (input_base, read_ext) = split_read_name(input);

        let work_dir = match output_dir {
            Some(dir) => dir.to_path_buf(),
            None => input
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default()
                .join(&input_base),
        };

        let base = match base_override {
            Some(name) => split_read_name(Path::new(name)).0,
            None => input_base,
        };

        RunPaths { work_dir, base, read_ext }
    }

    /// Creates the working directory if absent.
    pub fn ensure_dir(&self) -> io::Result<()> {
        fs::create_dir_all(&self.work_dir)
    }

    /// `<dir>/<base><suffix><ext>`
    pub fn artifact(&self, suffix: &str, ext: &str) -> PathBuf {
        self.work_dir.join(format!("{}{}{}", self.base, suffix, ext))
    }

    /// Path handed to the trimmer as its output; the exo-mode trimmed reads.
    pub fn trimmed(&self) -> PathBuf {
        self.artifact("", &self.read_ext)
    }

    pub fn matched(&self) -> PathBuf {
        self.artifact(MATCHED_SUFFIX, &self.read_ext)
    }

    pub fn unidentified(&self) -> PathBuf {
        self.artifact(UNIDENTIFIED_SUFFIX, &self.read_ext)
    }

    pub fn aligned(&self) -> PathBuf {
        self.artifact("", SAM_EXT)
    }

    pub fn filtered(&self) -> PathBuf {
        self.artifact(FILTERED_SUFFIX, BAM_EXT)
    }

    pub fn split_halves(&self) -> [PathBuf; 2] {
        [
            self.artifact(SPLIT_SUFFIXES[0], BAM_EXT),
            self.artifact(SPLIT_SUFFIXES[1], BAM_EXT),
        ]
    }

    /// Reads that go to the aligner.
    pub fn align_input(&self, exo: bool) -> PathBuf {
        if exo { self.trimmed() } else { self.matched() }
    }

    /// Files the trimmer must leave behind for the trim stage to count as done.
    pub fn trim_outputs(&self, exo: bool) -> Vec<PathBuf> {
        if exo {
            vec![self.trimmed()]
        } else {
            vec![self.matched(), self.unidentified()]
        }
    }

    /// Filtered artifacts that are carried through indexing.
    pub fn final_alignments(&self, random_split: bool) -> Vec<PathBuf> {
        if random_split {
            self.split_halves().to_vec()
        } else {
            vec![self.filtered()]
        }
    }

    /// Every file a stage of this run may write.
    pub fn all_outputs(&self, exo: bool, random_split: bool) -> Vec<PathBuf> {
        let mut files = self.trim_outputs(exo);
        files.push(self.aligned());
        files.push(self.filtered());
        for bam in self.final_alignments(random_split) {
            files.push(bam_index_path(&bam));
            if random_split {
                files.push(bam);
            }
        }
        files
    }

    /// Files removed by `--clean` once the run has succeeded.
    /// Without a random split `<base>_filtered.bam` is the final artifact and keeps its `.bai`;
    /// with one, the two halves are final and the unsplit BAM is only an intermediate.
    pub fn intermediates(&self, exo: bool, random_split: bool) -> Vec<PathBuf> {
        let mut files = self.trim_outputs(exo);
        files.push(self.aligned());
        if random_split {
            files.push(self.filtered());
        }
        files
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_split_read_name_compressed() {
        assert_eq!(split_read_name(Path::new("sample.fastq.gz")), ("sample".to_string(), ".fastq".to_string()));
        assert_eq!(split_read_name(Path::new("/data/run/reads.FQ.GZ")), ("reads".to_string(), ".FQ".to_string()));
        assert_eq!(split_read_name(Path::new("reads.fq.bz2")), ("reads".to_string(), ".fq".to_string()));
    }

    #[test]
    fn test_split_read_name_plain_and_bare() {
        assert_eq!(split_read_name(Path::new("reads.fq")), ("reads".to_string(), ".fq".to_string()));
        assert_eq!(split_read_name(Path::new("reads")), ("reads".to_string(), String::new()));
        assert_eq!(split_read_name(Path::new("archive.gz")), ("archive".to_string(), String::new()));
        assert_eq!(split_read_name(Path::new("my.sample.fastq")), ("my.sample".to_string(), ".fastq".to_string()));
    }

    #[test]
    fn test_resolve_default_dir() {
        let paths = RunPaths::resolve(Path::new("sample.fastq.gz"), None, None);
        assert_eq!(paths.work_dir, PathBuf::from("sample"));
        assert_eq!(paths.trimmed(), PathBuf::from("sample/sample.fastq"));
        assert_eq!(paths.matched(), PathBuf::from("sample/sample_matched_barcode.fastq"));
        assert_eq!(paths.unidentified(), PathBuf::from("sample/sample_unidentified.fastq"));
        assert_eq!(paths.aligned(), PathBuf::from("sample/sample.sam"));
        assert_eq!(paths.filtered(), PathBuf::from("sample/sample_filtered.bam"));
        assert_eq!(bam_index_path(&paths.filtered()), PathBuf::from("sample/sample_filtered.bam.bai"));
    }

    #[test]
    fn test_resolve_nested_input_and_overrides() {
        let paths = RunPaths::resolve(Path::new("/runs/a/lib1.fq"), None, None);
        assert_eq!(paths.work_dir, PathBuf::from("/runs/a/lib1"));

        let paths = RunPaths::resolve(Path::new("/runs/a/lib1.fq"), Some(Path::new("/out")), Some("renamed.bam"));
        assert_eq!(paths.work_dir, PathBuf::from("/out"));
        assert_eq!(paths.base, "renamed");
        assert_eq!(paths.filtered(), PathBuf::from("/out/renamed_filtered.bam"));
        assert_eq!(paths.trimmed(), PathBuf::from("/out/renamed.fq"));
    }

    #[test]
    fn test_intermediates_by_mode() {
        let paths = RunPaths::resolve(Path::new("s.fastq"), None, None);
        assert_eq!(
            paths.intermediates(false, false),
            vec![paths.matched(), paths.unidentified(), paths.aligned()]
        );
        assert_eq!(paths.intermediates(true, false), vec![paths.trimmed(), paths.aligned()]);
        assert!(paths.intermediates(true, true).contains(&paths.filtered()));
        assert!(!paths.intermediates(true, true).contains(&paths.split_halves()[0]));
    }

    #[test]
    fn test_same_location() -> io::Result<()> {
        let tmp = tempdir()?;
        let reads = tmp.path().join("reads.fastq");
        fs::write(&reads, b"")?;
        let via_dot = tmp.path().join(".").join("reads.fastq");
        assert!(same_location(&reads, &via_dot));
        assert!(!same_location(&reads, &tmp.path().join("reads/reads.fastq")));
        Ok(())
    }

    #[test]
    fn test_all_outputs_cover_trimmed_reads() {
        let paths = RunPaths::resolve(Path::new("/data/reads.fastq"), Some(Path::new("/data")), None);
        assert!(paths.all_outputs(true, false).contains(&PathBuf::from("/data/reads.fastq")));
        assert!(!paths.all_outputs(false, false).contains(&PathBuf::from("/data/reads.fastq")));
        assert!(paths.all_outputs(false, true).contains(&PathBuf::from("/data/reads_filtered_split2.bam.bai")));
    }

    #[test]
    fn test_index_prefix() {
        assert_eq!(index_prefix(Path::new("genome.fa"), None), PathBuf::from("genome"));
        assert_eq!(index_sentinel(&index_prefix(Path::new("genome.fa"), None)), PathBuf::from("genome.1.ebwt"));
        assert_eq!(index_prefix(Path::new("/ref/dm3.fa.gz"), None), PathBuf::from("/ref/dm3"));
        assert_eq!(index_prefix(Path::new("/ref/dm3.fa"), Some(Path::new("/idx"))), PathBuf::from("/idx/dm3"));
    }

    #[test]
    fn test_ensure_dir_creates_once() -> io::Result<()> {
        let tmp = tempdir()?;
        let paths = RunPaths::resolve(&tmp.path().join("reads.fastq"), None, None);
        assert!(!paths.work_dir.exists());
        paths.ensure_dir()?;
        assert!(paths.work_dir.is_dir());
        paths.ensure_dir()?;
        Ok(())
    }
}
