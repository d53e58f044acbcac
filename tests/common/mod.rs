//! Shared helpers for the integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use cmacro::syntax::printer::{normalize, render_plain};
use cmacro::{Engine, ExpandedUnit, ExpansionConfig, Result};

pub fn fixture(relative: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(relative)
}

pub fn expand_fixture(relative: &str) -> Result<ExpandedUnit> {
    expand_fixture_with(ExpansionConfig::default(), relative)
}

pub fn expand_fixture_with(config: ExpansionConfig, relative: &str) -> Result<ExpandedUnit> {
    Engine::new(config).expand_file(&fixture(relative))
}

/// Plain rendering of an expanded unit.
pub fn plain(unit: &ExpandedUnit) -> String {
    render_plain(&unit.fragments)
}

/// Asserts that two texts tokenize to the same program.
#[track_caller]
pub fn assert_same_program(actual: &str, expected: &str) {
    let actual = normalize(actual).expect("actual output tokenizes");
    let expected = normalize(expected).expect("expected output tokenizes");
    assert_eq!(actual, expected);
}
