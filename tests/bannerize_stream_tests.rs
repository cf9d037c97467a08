use std::io::{self, Cursor, Write};

use bannerize::{bannerize, bannerize_stream, StreamError, StreamStats};

struct BrokenPipe;

impl Write for BrokenPipe {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[test]
fn stream_matches_iterator_output() {
    let input = "\\chapter{Intro}\nText.\n\\section{Scope}\nMore.\n";
    let mut out = Vec::new();
    let stats = bannerize_stream(Cursor::new(input), &mut out).unwrap();

    let expected: String = bannerize(input.split_inclusive('\n')).map(|r| r.unwrap()).collect();
    assert_eq!(String::from_utf8(out).unwrap(), expected);
    assert_eq!(stats, StreamStats { lines_in: 4, lines_out: 10, banners: 2 });
}

#[test]
fn stream_keeps_missing_final_newline() {
    let mut out = Vec::new();
    bannerize_stream(Cursor::new("\\chapter{End}"), &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.ends_with("%\n\\chapter{End}"));
    assert_eq!(text.lines().count(), 4);
}

#[test]
fn stream_keeps_crlf() {
    let mut out = Vec::new();
    bannerize_stream(Cursor::new("a\r\n\\section{B}\r\n"), &mut out).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert_eq!(text.matches("\r\n").count(), 5);
    assert!(text.starts_with("a\r\n%"));
}

#[test]
fn stream_reports_read_errors() {
    let mut out = Vec::new();
    let err = bannerize_stream(Cursor::new(vec![0xffu8, 0xfe, b'\n']), &mut out).unwrap_err();
    assert!(matches!(err, StreamError::Read(_)));
}

#[test]
fn stream_reports_write_errors() {
    let err = bannerize_stream(Cursor::new("line\n"), BrokenPipe).unwrap_err();
    assert!(matches!(err, StreamError::Write(_)));
}
