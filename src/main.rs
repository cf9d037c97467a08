use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use bannerize::{
    bannerize, bannerize_file, bannerize_stream, enumerate_tex, is_latex_file, parse_args, write_report, FileOutcome,
    Mode, RewriteError, StreamError,
};

const EXIT_IO: i32 = 1;
const EXIT_BANNER: i32 = 2;
const EXIT_NO_FILES: i32 = 3;
const EXIT_USAGE: i32 = 4;

const USAGE: &str = "Usage:
  bannerize [--glob <pattern>] [--report <path>] FILE.tex...   rewrite LaTeX files in place
  bannerize LINE...                                            bannerize argument lines to stdout
                                                               (each argument is printed as its own line)
  bannerize < in.tex > out.tex                                 bannerize stdin to stdout";

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let opts = match parse_args(&args) {
        Ok(o) => o,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::json!({
                    "tool": "parse_args",
                    "error": e.to_string(),
                    "error_code": EXIT_USAGE
                })
            );
            eprintln!("{}", USAGE);
            std::process::exit(EXIT_USAGE);
        }
    };
    if opts.help {
        println!("{}", USAGE);
        return;
    }

    match opts.mode() {
        Mode::Files => {
            let mut files: Vec<PathBuf> = opts.positional.iter().map(PathBuf::from).collect();
            if let Some(pattern) = opts.glob.as_deref() {
                match enumerate_tex(pattern) {
                    Ok(found) => {
                        eprintln!(
                            "{}",
                            serde_json::json!({
                                "tool": "enumerate_tex",
                                "pattern": pattern,
                                "count": found.len()
                            })
                        );
                        files.extend(found);
                    }
                    Err(e) => {
                        eprintln!(
                            "{}",
                            serde_json::json!({
                                "tool": "enumerate_tex",
                                "pattern": pattern,
                                "error": e.to_string(),
                                "error_code": EXIT_NO_FILES
                            })
                        );
                        std::process::exit(EXIT_NO_FILES);
                    }
                }
            }
            let (outcomes, failure) = bannerize_files(&files);
            if let Some(report_path) = opts.report.as_deref() {
                emit_report(&outcomes, report_path);
            }
            if let Some(code) = failure {
                std::process::exit(code);
            }
        }
        Mode::ArgLines => {
            // Each argument is one line; give it a terminator so banners don't run into it.
            let lines = opts.positional.iter().map(|a| format!("{}\n", a));
            let stdout = io::stdout();
            let mut out = BufWriter::new(stdout.lock());
            for item in bannerize(lines) {
                let written = match item {
                    Ok(line) => out.write_all(line.as_bytes()).map_err(StreamError::Write),
                    Err(e) => Err(StreamError::Banner(e)),
                };
                if let Err(e) = written {
                    fail_stream("bannerize", e);
                }
            }
            if let Err(e) = out.flush() {
                fail_stream("bannerize", StreamError::Write(e));
            }
        }
        Mode::Stdin => {
            let stdin = io::stdin();
            let stdout = io::stdout();
            if let Err(e) = bannerize_stream(stdin.lock(), BufWriter::new(stdout.lock())) {
                fail_stream("bannerize_stream", e);
            }
        }
    }
}

/// Rewrite each path that is a LaTeX file; report and skip the rest.
/// Stops at the first failed rewrite and returns its exit code with the outcomes so far.
fn bannerize_files(files: &[PathBuf]) -> (Vec<FileOutcome>, Option<i32>) {
    let mut outcomes = Vec::with_capacity(files.len());
    for file in files {
        if !is_latex_file(file) {
            println!("Not a valid LaTeX file: {}. Skipped.", file.display());
            continue;
        }
        match bannerize_file(file) {
            Ok(outcome) => {
                println!("Bannerized {}.", file.display());
                eprintln!(
                    "{}",
                    serde_json::json!({
                        "tool": "bannerize_file",
                        "file": file,
                        "banners": outcome.banners,
                        "lines_in": outcome.lines_in,
                        "lines_out": outcome.lines_out,
                        "sha256_after": outcome.sha256_after
                    })
                );
                outcomes.push(outcome);
            }
            Err(err) => {
                let (code, label) = match &err {
                    RewriteError::Open { .. } => (EXIT_IO, "OpenFailed"),
                    RewriteError::Read { .. } => (EXIT_IO, "ReadFailed"),
                    RewriteError::Write { .. } => (EXIT_IO, "WriteFailed"),
                    RewriteError::Replace { .. } => (EXIT_IO, "ReplaceFailed"),
                    RewriteError::Banner(_) => (EXIT_BANNER, "BannerFailed"),
                };
                eprintln!(
                    "{}",
                    serde_json::json!({
                        "tool": "bannerize_file",
                        "file": file,
                        "error": label,
                        "detail": err.to_string(),
                        "error_code": code
                    })
                );
                return (outcomes, Some(code));
            }
        }
    }
    (outcomes, None)
}

fn emit_report(outcomes: &[FileOutcome], report_path: &Path) {
    match write_report(outcomes, report_path) {
        Ok(report) => {
            eprintln!(
                "{}",
                serde_json::json!({
                    "tool": "write_report",
                    "path": report_path,
                    "files": report.files.len(),
                    "banners": report.banners,
                    "changed": report.changed
                })
            );
        }
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::json!({
                    "tool": "write_report",
                    "path": report_path,
                    "error": e.to_string(),
                    "error_code": EXIT_IO
                })
            );
            std::process::exit(EXIT_IO);
        }
    }
}

fn fail_stream(tool: &str, err: StreamError) -> ! {
    let code = match err {
        StreamError::Banner(_) => EXIT_BANNER,
        StreamError::Read(_) | StreamError::Write(_) => EXIT_IO,
    };
    eprintln!(
        "{}",
        serde_json::json!({
            "tool": tool,
            "error": err.to_string(),
            "error_code": code
        })
    );
    std::process::exit(code);
}
