//! Test utilities for property-based testing
//!
//! This module provides generators and helpers for proptest.

#[cfg(test)]
pub mod generators {
    use crate::core::catalog::CatalogEntry;
    use proptest::prelude::*;

    /// Generate a build id (short, so collisions happen)
    pub fn build_id() -> impl Strategy<Value = String> {
        "[a-f0-9]{1,4}"
    }

    /// Generate an architecture as it may appear in a listing
    pub fn listed_arch() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("x64".to_string()),
            Just("X64".to_string()),
            Just("arm64".to_string()),
            Just("amd64".to_string()),
            Just("x86".to_string()),
        ]
    }

    /// Generate a build title, some matching `^Windows 11`
    pub fn build_title() -> impl Strategy<Value = String> {
        (
            prop_oneof![
                Just("Windows 11, version 24H2"),
                Just("Windows 11 Insider Preview"),
                Just("Windows 10, version 22H2"),
                Just("Cumulative Update for Windows 11"),
            ],
            1000u32..30000,
        )
            .prop_map(|(prefix, build)| format!("{prefix} (26100.{build})"))
    }

    /// Generate a listing timestamp, sometimes missing or malformed
    pub fn added_at() -> impl Strategy<Value = Option<String>> {
        prop_oneof![
            8 => (2020i32..2026, 1u32..13, 1u32..29, 0u32..24, 0u32..60).prop_map(
                |(y, mo, d, h, mi)| Some(format!("{y:04}-{mo:02}-{d:02} {h:02}:{mi:02}:00 UTC"))
            ),
            1 => Just(None),
            1 => Just(Some("not a date".to_string())),
        ]
    }

    /// Generate a catalog entry
    pub fn arb_catalog_entry() -> impl Strategy<Value = CatalogEntry> {
        (build_id(), build_title(), listed_arch(), added_at()).prop_map(
            |(id, title, arch, added_at)| CatalogEntry {
                href: format!("https://uupdump.net/selectlang.php?id={id}"),
                id,
                title,
                arch: Some(arch),
                added_at,
            },
        )
    }

    /// Generate an edition value
    pub fn edition_value() -> impl Strategy<Value = String> {
        "[A-Z]{3,12}"
    }

    /// Generate a line of a conversion script
    pub fn script_line() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("pause".to_string()),
            Just("  @PAUSE".to_string()),
            Just("echo pause".to_string()),
            Just(":: pause".to_string()),
            Just("\"%~dp0files\\aria2c.exe\" -x16 -i list.txt".to_string()),
            Just("aria2c.exe --retry-wait=5 -i list.txt".to_string()),
            "[a-z %=:@]{0,24}",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::generators::*;
    use crate::core::catalog::parse_added_at;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn test_build_id_not_empty(id in build_id()) {
            prop_assert!(!id.is_empty());
        }

        #[test]
        fn test_generated_dates_parse(stamp in added_at()) {
            if let Some(s) = stamp.filter(|s| s != "not a date") {
                prop_assert!(parse_added_at(&s).is_some());
            }
        }
    }
}
