//! Text of the completion notification.

use modelforge_core::types::DbId;

/// Public viewer page for a finished model.
pub fn viewer_url(base_url: &str, job_id: DbId) -> String {
    format!("{}/viewer/{job_id}", base_url.trim_end_matches('/'))
}

/// Status line sent first.
pub fn completion_text(job_id: DbId) -> String {
    format!("Processing done for process {job_id}")
}

/// Second message carrying the viewer link.
pub fn download_link_text(base_url: &str, job_id: DbId) -> String {
    format!(
        "You can download the model from this link: {}",
        viewer_url(base_url, job_id)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewer_url_strips_trailing_slash() {
        assert_eq!(
            viewer_url("https://app.example.com/", 42),
            "https://app.example.com/viewer/42"
        );
        assert_eq!(
            viewer_url("https://app.example.com", 42),
            "https://app.example.com/viewer/42"
        );
    }

    #[test]
    fn completion_text_names_job() {
        assert_eq!(completion_text(42), "Processing done for process 42");
    }

    #[test]
    fn download_link_text_contains_viewer() {
        assert_eq!(
            download_link_text("https://app.example.com", 7),
            "You can download the model from this link: https://app.example.com/viewer/7"
        );
    }
}
