// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;

fn render(headers: &[&str], rows: &[Vec<String>]) -> String {
    std::env::set_var("NO_COLOR", "1");
    let mut out = Vec::new();
    write_table(&mut out, headers, rows).unwrap();
    std::env::remove_var("NO_COLOR");
    String::from_utf8(out).unwrap()
}

#[test]
#[serial]
fn columns_fit_widest_cell() {
    let rows = vec![
        vec!["agi-amd64-7".to_string(), "a1b2".to_string()],
        vec!["web".to_string(), "c3d4".to_string()],
    ];
    assert_eq!(render(&["KEY", "TOKEN"], &rows), "KEY         TOKEN\nagi-amd64-7 a1b2\nweb         c3d4\n");
}

#[test]
#[serial]
fn header_wider_than_cells() {
    let rows = vec![vec!["k".to_string(), "v".to_string()]];
    assert_eq!(render(&["VERSION KEY", "TOKEN"], &rows), "VERSION KEY TOKEN\nk           v\n");
}

#[test]
fn format_or_json_runs_text_branch() {
    let mut ran = false;
    format_or_json(OutputFormat::Text, &1, || {
        ran = true;
        Ok(())
    })
    .unwrap();
    assert!(ran);
}
