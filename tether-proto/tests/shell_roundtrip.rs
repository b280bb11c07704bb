//! Evaluates quoted tokens in a real POSIX shell and checks that the shell
//! hands back exactly the original strings.
//!
//! Skipped when no `sh` is available.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::print_stderr)]

use std::process::Command;

use proptest::prelude::*;
use tether_proto::{Style, classify, join, quote};

/// Runs `printf '%s\0'` over `words` in `sh` and splits the result on NUL.
fn shell_split(words: &str) -> Option<Vec<String>> {
    let out = Command::new("sh")
        .arg("-c")
        .arg(format!("printf '%s\\0' {words}"))
        .output()
        .ok()?;
    assert!(out.status.success(), "sh rejected: {words:?}");
    let mut fields: Vec<String> = out
        .stdout
        .split(|&b| b == 0)
        .map(|f| String::from_utf8(f.to_vec()).expect("shell produced invalid UTF-8"))
        .collect();
    // printf emits a trailing NUL after the last field; `words` must be
    // non-empty or printf still prints one empty field.
    fields.pop();
    Some(fields)
}

/// Characters weighted toward the ones that stress every quoting style.
fn token_char() -> impl Strategy<Value = char> {
    prop_oneof![
        4 => proptest::char::range('a', 'z'),
        2 => Just(' '),
        2 => prop::sample::select(vec!['-', '.', '/', '0', '7', '9']),
        1 => prop::sample::select(vec![
            '\'', '"', '`', '$', '\\', '!', '%', '*', '?', '#', '~', '=', '{', '}',
            '&', ';', '|', '<', '>', '(', ')', '[', ']', '\t', '\n', '\r',
        ]),
        1 => prop::sample::select(vec!['é', '€', 'ß', '😀', '中']),
    ]
}

fn token() -> impl Strategy<Value = String> {
    prop::collection::vec(token_char(), 0..16).prop_map(|cs| cs.into_iter().collect())
}

#[test]
fn fixed_corpus_roundtrips() {
    let corpus = [
        "",
        "plain",
        "two words",
        "it's",
        "it's $HOME and `date`",
        "back\\slash",
        "\"dq\"",
        "line\nbreak",
        "trailing\n",
        "\n\n",
        "cr\r",
        "100% \\n",
        "tab\there",
        "ünïcödé 😀",
        "-n",
        "-n\nx",
        "--\r",
        "*",
        "~",
        "#comment",
    ];
    let Some(fields) = shell_split(&join(corpus)) else {
        return;
    };
    assert_eq!(fields, corpus);
}

#[test]
fn every_style_is_reached() {
    let samples = ["a", "a b", "a'b", "a'$", "a\nb"];
    let styles: Vec<Style> = samples.iter().map(|s| classify(s)).collect();
    assert_eq!(
        styles,
        [
            Style::Bare,
            Style::SingleQuoted,
            Style::DoubleQuoted,
            Style::Dithered,
            Style::PrintfEscaped,
        ]
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn quote_roundtrips(s in token()) {
        if let Some(fields) = shell_split(&quote(&s)) {
            prop_assert_eq!(fields, vec![s]);
        }
    }

    #[test]
    fn join_roundtrips(tokens in prop::collection::vec(token(), 1..6)) {
        if let Some(fields) = shell_split(&join(&tokens)) {
            prop_assert_eq!(fields, tokens);
        }
    }
}
