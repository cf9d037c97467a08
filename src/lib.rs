use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use globwalk::GlobWalkerBuilder;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Heading pattern. Matched against a line without its terminator, so `$` sits at the true end.
static TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^.*(?:chapter|section)\{(.+?)\}.*$").expect("title pattern compiles"));

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BannerError {
    #[error("NoTitleFound: could not parse title from {line:?}")]
    NoTitleFound { line: String },
    #[error("InvalidWidth: banner width {width} is narrower than its two borders")]
    InvalidWidth { width: usize },
}

/// Extract the title of a `\chapter{..}` / `\section{..}` line.
/// Returns None for any line that is not a heading line.
pub fn get_title(line: &str) -> Option<&str> {
    TITLE_RE
        .captures(strip_terminator(line))
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_str())
}

fn strip_terminator(line: &str) -> &str {
    match line.strip_suffix('\n') {
        Some(rest) => rest.strip_suffix('\r').unwrap_or(rest),
        None => line,
    }
}

/// Terminator used for constructed lines: whatever the heading line ends with, `\n` if nothing.
pub fn line_terminator(line: &str) -> &'static str {
    if line.ends_with("\r\n") {
        "\r\n"
    } else {
        "\n"
    }
}

/// `%`, `width - 2` times `=`, `%`.
pub fn rule(width: usize, eol: &str) -> Result<String, BannerError> {
    if width < 2 {
        return Err(BannerError::InvalidWidth { width });
    }
    let mut out = String::with_capacity(width + eol.len());
    out.push('%');
    out.extend(std::iter::repeat('=').take(width - 2));
    out.push('%');
    out.push_str(eol);
    Ok(out)
}

/// Build the centered title line of a banner.
///
/// The title starts at body offset `width/2 - len/2 - 1` (floor division), which puts it
/// one column left of true center when the widths disagree in parity. A title wider than
/// the body is emitted whole; the line then ends up longer than `width`.
pub fn title_line(width: usize, title: &str, eol: &str) -> Result<String, BannerError> {
    if width < 2 {
        return Err(BannerError::InvalidWidth { width });
    }
    let title_len = title.chars().count() as isize;
    let body = width as isize - 2;
    let title_start = width as isize / 2 - title_len / 2 - 1;
    let title_end = title_start + title_len;

    let mut out = String::with_capacity(width + title.len() + eol.len());
    out.push('%');
    let mut i: isize = 0;
    while i < body {
        if i >= title_start && i < title_end {
            out.push_str(title);
            i += title_len;
        } else {
            out.push(' ');
            i += 1;
        }
    }
    out.push('%');
    out.push_str(eol);
    Ok(out)
}

/// Build `[rule, title line, rule]` for a heading line.
/// Width is the trimmed char count of `line`; the terminator follows `line`'s own.
pub fn build_banner(line: &str) -> Result<[String; 3], BannerError> {
    let title = get_title(line).ok_or_else(|| BannerError::NoTitleFound { line: line.to_string() })?;
    let width = line.trim().chars().count();
    let eol = line_terminator(line);

    let top = rule(width, eol)?;
    let middle = title_line(width, title, eol)?;
    let bottom = top.clone();
    Ok([top, middle, bottom])
}

fn banner_for(line: &str) -> Result<Option<[String; 3]>, BannerError> {
    if get_title(line).is_none() {
        return Ok(None);
    }
    build_banner(line).map(Some)
}

/// Lazy banner injection over any line sequence. See [`bannerize`].
#[derive(Debug)]
pub struct Bannerize<I> {
    lines: I,
    pending: VecDeque<String>,
    failed: bool,
}

/// Inject a banner before every heading line of `lines`.
///
/// Lines pass through unchanged and in order. At most one input line and its banner are
/// held at a time. A banner failure is yielded once, after which the iterator is exhausted.
pub fn bannerize<I>(lines: I) -> Bannerize<I::IntoIter>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    Bannerize { lines: lines.into_iter(), pending: VecDeque::with_capacity(4), failed: false }
}

impl<I> Iterator for Bannerize<I>
where
    I: Iterator,
    I::Item: AsRef<str>,
{
    type Item = Result<String, BannerError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(line) = self.pending.pop_front() {
            return Some(Ok(line));
        }
        if self.failed {
            return None;
        }
        let item = self.lines.next()?;
        let line = item.as_ref();
        match banner_for(line) {
            Ok(Some(banner)) => {
                self.pending.extend(banner);
                self.pending.push_back(line.to_string());
                self.pending.pop_front().map(Ok)
            }
            Ok(None) => Some(Ok(line.to_string())),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub lines_in: usize,
    pub lines_out: usize,
    pub banners: usize,
}

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("ReadFailed: {0}")]
    Read(#[source] io::Error),
    #[error("WriteFailed: {0}")]
    Write(#[source] io::Error),
    #[error(transparent)]
    Banner(#[from] BannerError),
}

/// Bannerize a reader into a writer, one line at a time, keeping every line terminator.
pub fn bannerize_stream<R: BufRead, W: Write>(mut reader: R, mut writer: W) -> Result<StreamStats, StreamError> {
    let mut stats = StreamStats::default();
    let mut line = String::new();
    loop {
        line.clear();
        let n = reader.read_line(&mut line).map_err(StreamError::Read)?;
        if n == 0 {
            break;
        }
        stats.lines_in += 1;
        if let Some(banner) = banner_for(&line)? {
            for banner_line in &banner {
                writer.write_all(banner_line.as_bytes()).map_err(StreamError::Write)?;
            }
            stats.banners += 1;
            stats.lines_out += banner.len();
        }
        writer.write_all(line.as_bytes()).map_err(StreamError::Write)?;
        stats.lines_out += 1;
    }
    writer.flush().map_err(StreamError::Write)?;
    Ok(stats)
}

/// True iff `path` is an existing regular file with a `.tex` extension.
pub fn is_latex_file(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == "tex") && path.is_file()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOutcome {
    pub file: String,
    pub lines_in: usize,
    pub lines_out: usize,
    pub banners: usize,
    pub sha256_before: String,
    pub sha256_after: String,
    pub changed: bool,
}

#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("OpenFailed: {}: {}", .path.display(), .source)]
    Open { path: PathBuf, source: io::Error },
    #[error("ReadFailed: {}: {}", .path.display(), .source)]
    Read { path: PathBuf, source: io::Error },
    #[error("WriteFailed: {}: {}", .path.display(), .source)]
    Write { path: PathBuf, source: io::Error },
    #[error("ReplaceFailed: {}: {}", .path.display(), .source)]
    Replace { path: PathBuf, source: io::Error },
    #[error(transparent)]
    Banner(#[from] BannerError),
}

/// Bannerize a LaTeX file in place.
///
/// Output goes to a `.swp` temp file next to `path`, which is flushed, synced and then
/// renamed over the original. The original is untouched if anything fails before the rename.
pub fn bannerize_file(path: &Path) -> Result<FileOutcome, RewriteError> {
    let open_err = |e| RewriteError::Open { path: path.to_path_buf(), source: e };
    let read_err = |e| RewriteError::Read { path: path.to_path_buf(), source: e };
    let write_err = |e| RewriteError::Write { path: path.to_path_buf(), source: e };

    let source = File::open(path).map_err(open_err)?;
    let permissions = source.metadata().map_err(read_err)?.permissions();

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let mut swap = tempfile::Builder::new()
        .prefix(&format!(".{}.", name))
        .suffix(".swp")
        .tempfile_in(dir)
        .map_err(write_err)?;

    let mut reader = BufReader::new(HashingReader::new(source));
    let stats = {
        let writer = BufWriter::new(swap.as_file_mut());
        bannerize_stream(&mut reader, writer).map_err(|e| match e {
            StreamError::Read(e) => read_err(e),
            StreamError::Write(e) => write_err(e),
            StreamError::Banner(e) => RewriteError::Banner(e),
        })?
    };
    let sha256_before = reader.into_inner().hex();
    swap.as_file().sync_all().map_err(write_err)?;
    fs::set_permissions(swap.path(), permissions).map_err(write_err)?;
    let sha256_after = sha256_file(swap.path()).map_err(read_err)?;

    swap.persist(path)
        .map_err(|e| RewriteError::Replace { path: path.to_path_buf(), source: e.error })?;

    Ok(FileOutcome {
        file: path.display().to_string(),
        lines_in: stats.lines_in,
        lines_out: stats.lines_out,
        banners: stats.banners,
        changed: sha256_before != sha256_after,
        sha256_before,
        sha256_after,
    })
}

#[derive(Debug, Error)]
pub enum EnumerateError {
    #[error("NoFilesFound: {pattern}")]
    NoFilesFound { pattern: String },
}

/// Expand a glob (e.g. "chapters/**/*.tex") into a sorted list of `.tex` files.
pub fn enumerate_tex(glob_pattern: &str) -> Result<Vec<PathBuf>, EnumerateError> {
    let no_files = || EnumerateError::NoFilesFound { pattern: glob_pattern.to_string() };
    let (root, pat) = split_glob(glob_pattern);
    if !root.is_dir() {
        return Err(no_files());
    }
    let mut paths: Vec<PathBuf> = GlobWalkerBuilder::from_patterns(&root, &[pat.as_str()])
        .case_insensitive(false)
        .follow_links(false)
        .build()
        .map_err(|_| no_files())?
        .filter_map(|e| e.ok())
        .map(|e| e.path().to_path_buf())
        .collect();

    paths.sort();
    paths.retain(|p| is_latex_file(p));

    if paths.is_empty() {
        return Err(no_files());
    }
    Ok(paths)
}

/// Split a glob into its literal leading directory and the remaining pattern,
/// so the walk starts as deep as possible.
fn split_glob(pattern: &str) -> (PathBuf, String) {
    let pattern = pattern.strip_prefix("./").unwrap_or(pattern);
    let is_glob = |s: &str| s.contains(|c: char| matches!(c, '*' | '?' | '[' | '{'));
    let parts: Vec<&str> = pattern.split('/').collect();
    let literal = parts.iter().take(parts.len().saturating_sub(1)).take_while(|p| !is_glob(**p)).count();

    let mut root = if pattern.starts_with('/') { PathBuf::from("/") } else { PathBuf::from(".") };
    for part in parts.iter().take(literal).filter(|p| !p.is_empty()) {
        root.push(part);
    }
    (root, parts[literal..].join("/"))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub files: Vec<FileOutcome>,
    pub banners: usize,
    pub changed: usize,
}

impl RunReport {
    pub fn from_outcomes(outcomes: &[FileOutcome]) -> Self {
        RunReport {
            files: outcomes.to_vec(),
            banners: outcomes.iter().map(|o| o.banners).sum(),
            changed: outcomes.iter().filter(|o| o.changed).count(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("SerializeFailed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("WriteFailed: {0}")]
    WriteFailed(String),
}

/// Atomically write the JSON run report to `path`.
pub fn write_report(outcomes: &[FileOutcome], path: &Path) -> Result<RunReport, ReportError> {
    let report = RunReport::from_outcomes(outcomes);
    let bytes = serde_json::to_vec_pretty(&report)?;

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).map_err(|e| ReportError::WriteFailed(e.to_string()))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| ReportError::WriteFailed(e.to_string()))?;
    tmp.write_all(&bytes).map_err(|e| ReportError::WriteFailed(e.to_string()))?;
    tmp.as_file().sync_all().map_err(|e| ReportError::WriteFailed(e.to_string()))?;
    tmp.persist(path).map_err(|e| ReportError::WriteFailed(e.error.to_string()))?;
    Ok(report)
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex_digest(Sha256::digest(bytes).as_slice())
}

fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex_digest(hasher.finalize().as_slice()))
}

fn hex_digest(digest: &[u8]) -> String {
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Hashes everything read through it, so the digest covers exactly the bytes transformed.
struct HashingReader<R> {
    inner: R,
    hasher: Sha256,
}

impl<R: Read> HashingReader<R> {
    fn new(inner: R) -> Self {
        HashingReader { inner, hasher: Sha256::new() }
    }

    fn hex(self) -> String {
        hex_digest(self.hasher.finalize().as_slice())
    }
}

impl<R: Read> Read for HashingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub glob: Option<String>,
    pub report: Option<PathBuf>,
    pub positional: Vec<String>,
    pub help: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgsError {
    #[error("MissingValue: {0} expects a value")]
    MissingValue(String),
    #[error("UnknownFlag: {0}")]
    UnknownFlag(String),
}

/// How a run sources its lines, decided from the parsed options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Files,
    ArgLines,
    Stdin,
}

/// Parse command-line arguments (without the program name). `--` ends flag parsing.
pub fn parse_args(args: &[String]) -> Result<RunOptions, ArgsError> {
    let mut opts = RunOptions::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--" => {
                opts.positional.extend(iter.by_ref().cloned());
            }
            "-h" | "--help" => opts.help = true,
            "--glob" | "--report" => {
                let val = iter.next().ok_or_else(|| ArgsError::MissingValue(arg.clone()))?;
                if arg == "--glob" {
                    opts.glob = Some(val.clone());
                } else {
                    opts.report = Some(PathBuf::from(val));
                }
            }
            s if s.starts_with("--glob=") => opts.glob = Some(s["--glob=".len()..].to_string()),
            s if s.starts_with("--report=") => opts.report = Some(PathBuf::from(&s["--report=".len()..])),
            s if s.starts_with("--") && s.len() > 2 => return Err(ArgsError::UnknownFlag(s.to_string())),
            _ => opts.positional.push(arg.clone()),
        }
    }
    Ok(opts)
}

impl RunOptions {
    pub fn mode(&self) -> Mode {
        let first_is_tex = self.positional.first().map_or(false, |a| a.ends_with(".tex"));
        if self.glob.is_some() || first_is_tex {
            Mode::Files
        } else if !self.positional.is_empty() {
            Mode::ArgLines
        } else {
            Mode::Stdin
        }
    }
}
