use std::path::Path;

use auth::{Principal, StaticKeyDirectory};

/// Loads a `StaticKeyDirectory` from a CSV file of
/// `api_key,principal_id,display_name,requests_per_minute,requests_per_hour`
/// lines. Stands in for the out-of-scope key issuance/rotation system.
pub fn load_key_directory(path: &Path) -> anyhow::Result<StaticKeyDirectory> {
    let contents = std::fs::read_to_string(path)
        .map_err(|err| anyhow::anyhow!("failed to read key directory {}: {err}", path.display()))?;
    let raw_keys = parse_lines(&contents)?;
    Ok(StaticKeyDirectory::from_raw_keys(raw_keys))
}

/// Blank lines and lines starting with `#` are skipped.
fn parse_lines(contents: &str) -> anyhow::Result<Vec<(String, Principal)>> {
    let mut raw_keys = Vec::new();
    for (line_no, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let [api_key, principal_id, display_name, rpm, rph] = fields.as_slice() else {
            anyhow::bail!("key directory line {}: expected 5 comma-separated fields", line_no + 1);
        };

        raw_keys.push((
            api_key.to_string(),
            Principal {
                id: principal_id.to_string(),
                display_name: display_name.to_string(),
                requests_per_minute: rpm.parse()?,
                requests_per_hour: rph.parse()?,
            },
        ));
    }
    Ok(raw_keys)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_csv_and_skips_comments() {
        let contents = "# comment\n\nkey-alice,alice,Alice,60,1000\nkey-bob,bob,Bob,30,500\n";
        let keys = parse_lines(contents).unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].0, "key-alice");
        assert_eq!(keys[0].1.id, "alice");
        assert_eq!(keys[1].1.requests_per_hour, 500);
    }

    #[test]
    fn rejects_malformed_line() {
        let err = parse_lines("only,three,fields").unwrap_err();
        assert!(err.to_string().contains("expected 5"));
    }
}
