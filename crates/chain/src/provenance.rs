/// Checks that a log was emitted by the configured marketplace contract.
///
/// With no expected address every origin is accepted; callers should surface
/// [`ProvenanceVerifier::is_enforcing`] as a warning.
#[derive(Debug, Clone, Default)]
pub struct ProvenanceVerifier {
    expected: Option<String>,
}

impl ProvenanceVerifier {
    pub fn new(expected: Option<&str>) -> Self {
        Self { expected: expected.map(canonicalize).filter(|s| !s.is_empty()) }
    }

    pub fn is_enforcing(&self) -> bool { self.expected.is_some() }

    pub fn verify(&self, emitting_address: &str) -> bool {
        let Some(expected) = &self.expected else {
            return true;
        };
        let actual = canonicalize(emitting_address);
        if actual == *expected {
            true
        } else {
            tracing::warn!(
                "Provenance mismatch: log emitted by {} but expected {}",
                actual,
                expected
            );
            false
        }
    }
}

fn canonicalize(address: &str) -> String { address.trim().to_ascii_lowercase() }
