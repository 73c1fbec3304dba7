//! Child process environment
//!
//! Children inherit the runner's environment, overlaid with `KEY=VALUE`
//! assignments from an optional local override file. Values are taken as
//! written: no quote stripping, no `$VAR` expansion.

use std::collections::HashMap;
use std::path::Path;

use shared::{process_debug, process_warn, ProcessId};

/// Ambient environment merged with the overrides in `override_file`
pub fn build_environment(override_file: &Path) -> HashMap<String, String> {
    let ambient = std::env::vars_os()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)));
    build_environment_from(ambient, override_file)
}

/// Same as [`build_environment`] with an explicit ambient environment
pub fn build_environment_from<I>(ambient: I, override_file: &Path) -> HashMap<String, String>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut env: HashMap<String, String> = ambient.into_iter().collect();

    match std::fs::read_to_string(override_file) {
        Ok(contents) => {
            let overrides = parse_overrides(&contents);
            process_debug!(
                ProcessId::Runner,
                "Loaded {} environment overrides from {}",
                overrides.len(),
                override_file.display()
            );
            env.extend(overrides);
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            process_debug!(
                ProcessId::Runner,
                "No environment override file at {}",
                override_file.display()
            );
        }
        Err(e) => {
            process_warn!(
                ProcessId::Runner,
                "Ignoring unreadable environment override file {}: {}",
                override_file.display(),
                e
            );
        }
    }

    env
}

/// Parse override lines in file order; later duplicates win when collected
pub fn parse_overrides(contents: &str) -> Vec<(String, String)> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let line = line.strip_prefix("export ").unwrap_or(line);
            let (key, value) = line.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), value.trim().to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_skips_comments_and_blank_lines() {
        let parsed = parse_overrides("# comment\n\nexport FOO=bar\nBAZ=qux\n");
        assert_eq!(
            parsed,
            vec![("FOO".to_string(), "bar".to_string()), ("BAZ".to_string(), "qux".to_string())]
        );
    }

    #[test]
    fn test_values_are_verbatim() {
        let parsed = parse_overrides("A=\"quoted\"\nB=$HOME/x\nC=a=b\nNOEQUALS\n=novalue\n");
        assert_eq!(
            parsed,
            vec![
                ("A".to_string(), "\"quoted\"".to_string()),
                ("B".to_string(), "$HOME/x".to_string()),
                ("C".to_string(), "a=b".to_string()),
            ]
        );
    }

    #[test]
    fn test_overrides_merge_over_ambient() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "# comment\n\nexport FOO=bar\nBAZ=qux\nFOO=later\n").unwrap();

        let ambient = vec![
            ("PATH".to_string(), "/usr/bin".to_string()),
            ("BAZ".to_string(), "ambient".to_string()),
        ];
        let env = build_environment_from(ambient, &path);

        assert_eq!(env.len(), 3);
        assert_eq!(env["PATH"], "/usr/bin");
        assert_eq!(env["BAZ"], "qux");
        assert_eq!(env["FOO"], "later");
    }

    #[test]
    fn test_missing_override_file_falls_back_to_ambient() {
        let ambient = vec![("ONLY".to_string(), "ambient".to_string())];
        let env = build_environment_from(ambient, Path::new("/no/such/.env"));
        assert_eq!(env.len(), 1);
        assert_eq!(env["ONLY"], "ambient");
    }
}
