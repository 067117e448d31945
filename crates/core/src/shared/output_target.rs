use crate::shared::constants::{STDOUT_DESTINATIONS, STDOUT_PIPE};

/// Maps the user-facing output path onto a URL the container library opens.
pub fn resolve_output_url(file: &str) -> String {
    if file == "-" {
        STDOUT_PIPE.to_string()
    } else {
        file.to_string()
    }
}

/// True when writing to `url` would land on standard output, in which case
/// diagnostics must go elsewhere.
pub fn is_stdout_destination(url: &str) -> bool {
    url == "-" || STDOUT_DESTINATIONS.contains(&url)
}
