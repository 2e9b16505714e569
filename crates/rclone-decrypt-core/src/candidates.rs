//! Lists the crypt remotes that survived config adaptation.

use crate::error::{DecryptError, DecryptResult};
use crate::tool::{AdaptedConfig, CandidateName, RemoteTool};
use log::{debug, info};

/// Ask the tool which remotes `config` defines, in the order it reports them.
///
/// An empty list is a valid result. Failing to run `listremotes` at all is a
/// `ConfigAdaptation` error; cancellation passes through untouched.
pub fn enumerate<T>(tool: &T, config: &AdaptedConfig) -> DecryptResult<Vec<CandidateName>>
where
    T: RemoteTool<Error = DecryptError>,
{
    debug!("adapted rclone config:\n{}", config.contents());

    let candidates = tool.list_remotes(config.path()).map_err(|err| match err {
        DecryptError::Interrupted => DecryptError::Interrupted,
        DecryptError::ConfigAdaptation(message) => DecryptError::ConfigAdaptation(message),
        other => DecryptError::ConfigAdaptation(format!(
            "listing remotes with {} failed: {other}",
            tool.describe()
        )),
    })?;

    if candidates.is_empty() {
        info!("no crypt remotes found in the adapted configuration");
    } else {
        let names: Vec<&str> = candidates.iter().map(CandidateName::as_str).collect();
        info!("crypt remotes to try: {}", names.join(", "));
    }
    Ok(candidates)
}

/// Parse `rclone listremotes` output: one `name:` per line, blanks ignored.
pub fn parse_listremotes(stdout: &str) -> Vec<CandidateName> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(CandidateName::new)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listremotes_output_keeps_order() {
        let parsed = parse_listremotes("zeta:\n\nalpha:\r\n  mid:  \n");
        let names: Vec<&str> = parsed.iter().map(CandidateName::as_str).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn empty_listremotes_output_is_empty() {
        assert!(parse_listremotes("").is_empty());
        assert!(parse_listremotes("\n\n").is_empty());
    }
}
