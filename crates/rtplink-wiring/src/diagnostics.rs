use rtplink_core::{describe_capabilities, LinkResult};
use tracing::error;

/// Serialized capability descriptors of a failed negotiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatDiagnostic {
    pub port_name: String,
    pub src_caps: String,
    pub sink_caps: String,
}

impl std::fmt::Display for FormatDiagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Src port format:\n{}\nSink port format:\n{}",
            self.src_caps, self.sink_caps
        )
    }
}

/// Makes format negotiation failures visible to the operator. Logging only:
/// cancelling the run is up to the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiagnosticReporter;

impl DiagnosticReporter {
    /// Emit both descriptors of a `FormatMismatch`. Other results produce no
    /// output and return `None`.
    pub fn report(&self, port_name: &str, result: &LinkResult) -> Option<FormatDiagnostic> {
        let LinkResult::FormatMismatch { src_caps, sink_caps } = result else {
            return None;
        };

        let diagnostic = FormatDiagnostic {
            port_name: port_name.to_owned(),
            src_caps: describe_capabilities(src_caps.as_ref()),
            sink_caps: describe_capabilities(sink_caps.as_ref()),
        };
        error!(
            port = %diagnostic.port_name,
            src_caps = %diagnostic.src_caps,
            sink_caps = %diagnostic.sink_caps,
            "Linking '{}' failed: no common format",
            diagnostic.port_name
        );
        Some(diagnostic)
    }
}
