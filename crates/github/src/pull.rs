use std::{fmt, sync::OnceLock};

use regex::Regex;

/// A pull request on github.com.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PrReference {
    pub owner: String,
    pub repo: String,
    pub number: u64,
}

impl fmt::Display for PrReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.number)
    }
}

/// Extract a pull request reference from a URL.
///
/// Only the prefix `http(s)://github.com/{owner}/{repo}/pull/{number}` is matched,
/// so trailing paths such as `/files` or query strings are accepted.
pub fn extract_pull_request_url(url: &str) -> Option<PrReference> {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    let caps = REGEX
        .get_or_init(|| {
            Regex::new(
                r"^https?://github\.com/(?P<owner>[^/]+)/(?P<repo>[^/]+)/pull/(?P<number>\d+)",
            )
            .unwrap()
        })
        .captures(url)?;
    let number = caps.name("number")?.as_str().parse::<u64>().ok().filter(|&n| n > 0)?;
    Some(PrReference {
        owner: caps.name("owner")?.as_str().to_string(),
        repo: caps.name("repo")?.as_str().to_string(),
        number,
    })
}
