use bannerize::{build_banner, rule, title_line, BannerError};

#[test]
fn rule_spans_width() {
    assert_eq!(rule(5, "\n").unwrap(), "%===%\n");
    assert_eq!(rule(2, "\n").unwrap(), "%%\n");
    assert_eq!(rule(16, "").unwrap().chars().count(), 16);
}

#[test]
fn rule_rejects_widths_below_two() {
    assert_eq!(rule(1, "\n"), Err(BannerError::InvalidWidth { width: 1 }));
    assert_eq!(rule(0, "\n"), Err(BannerError::InvalidWidth { width: 0 }));
    assert_eq!(title_line(1, "x", "\n"), Err(BannerError::InvalidWidth { width: 1 }));
}

#[test]
fn title_line_odd_width() {
    // start = 15/2 - 5/2 - 1 = 4
    assert_eq!(title_line(15, "Intro", "\n").unwrap(), "%    Intro    %\n");
}

#[test]
fn title_line_even_width_leans_right_for_odd_title() {
    // start = 16/2 - 5/2 - 1 = 5, leaving 4 trailing
    assert_eq!(title_line(16, "Intro", "\n").unwrap(), "%     Intro    %\n");
}

#[test]
fn title_filling_body_has_no_padding() {
    assert_eq!(title_line(7, "ABCDE", "\n").unwrap(), "%ABCDE%\n");
    assert_eq!(title_line(8, "ABCDEF", "\n").unwrap(), "%ABCDEF%\n");
}

#[test]
fn title_wider_than_body_is_not_truncated() {
    let line = title_line(6, "ABCDEFGH", "\n").unwrap();
    assert_eq!(line, "%ABCDEFGH%\n");
    assert!(line.trim_end().chars().count() > 6);

    let line = title_line(10, "ABCDEFGHI", "").unwrap();
    assert_eq!(line, "%ABCDEFGHI%");
}

#[test]
fn padding_difference_follows_parity() {
    for width in 4..40usize {
        for len in 1..=(width - 2) {
            let title = "x".repeat(len);
            let line = title_line(width, &title, "").unwrap();
            assert_eq!(line.chars().count(), width, "width={} len={}", width, len);
            let body = &line[1..line.len() - 1];
            let leading = body.find('x').unwrap() as isize;
            let trailing = (body.len() - body.rfind('x').unwrap() - 1) as isize;
            let expected = (len % 2) as isize - (width % 2) as isize;
            assert_eq!(leading - trailing, expected, "width={} len={}", width, len);
        }
    }
}

#[test]
fn banner_for_section_line() {
    let banner = build_banner("\\section{Intro}\n").unwrap();
    assert_eq!(banner[0], "%=============%\n");
    assert_eq!(banner[1], "%    Intro    %\n");
    assert_eq!(banner[2], banner[0]);
}

#[test]
fn banner_width_ignores_surrounding_whitespace() {
    let banner = build_banner("   \\section{Intro}\t \n").unwrap();
    assert_eq!(banner, build_banner("\\section{Intro}\n").unwrap());
}

#[test]
fn banner_follows_line_terminator() {
    let crlf = build_banner("\\chapter{End}\r\n").unwrap();
    assert!(crlf.iter().all(|l| l.ends_with("\r\n")));
    assert_eq!(crlf[0].trim_end().chars().count(), "\\chapter{End}".len());

    let bare = build_banner("\\chapter{End}").unwrap();
    assert!(bare.iter().all(|l| l.ends_with('\n') && !l.ends_with("\r\n")));
}

#[test]
fn banner_counts_chars_not_bytes() {
    let banner = build_banner("\\section{Über}\n").unwrap();
    assert_eq!(banner[0], "%============%\n");
    assert_eq!(banner[1], "%    Über    %\n");
}

#[test]
fn banner_without_title_is_an_error() {
    let err = build_banner("plain text line\n").unwrap_err();
    assert_eq!(err, BannerError::NoTitleFound { line: "plain text line\n".to_string() });
    assert!(err.to_string().starts_with("NoTitleFound"));
}
