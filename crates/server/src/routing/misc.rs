//! Health, version and feedback handlers. None of these touch the
//! core sync protocol; they exist so operators and the hishtory CLI can
//! check liveness, advertise new releases and collect opt-in feedback.

use hishtory_data::StorageAdapter;
use serde::{Deserialize, Serialize};

use salvo::prelude::*;

use crate::error::AppError;
use crate::{config, maintainer, state};

/// Advisory, not persisted: accepted and logged, never read back.
#[derive(Debug, Deserialize)]
pub struct Feedback {
    pub user_id: String,
    pub feedback: String,
}

#[derive(Debug, Serialize)]
pub struct UpdateInfo {
    pub version: String,
    pub download_url: String,
}

#[handler]
pub async fn healthcheck(res: &mut Response) -> Result<(), AppError> {
    if config::get().is_prod() {
        state::adapter().num_connections().await?;
    }
    res.render("OK");
    Ok(())
}

/// Escapes the five characters HTML needs escaped in text content and
/// double-quoted attribute values; the banner has no other HTML structure.
fn escape_html(text: &str) -> String {
    text.chars().fold(String::with_capacity(text.len()), |mut out, c| {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
        out
    })
}

#[handler]
pub async fn banner(req: &mut Request, res: &mut Response) -> Result<(), AppError> {
    let commit_hash = req.query::<String>("commit_hash").unwrap_or_default();
    let device_id = req.query::<String>("device_id").unwrap_or_default();
    if let Some(forced) = req.query::<String>("forced_banner") {
        res.render(escape_html(&forced));
        return Ok(());
    }

    tracing::debug!(%commit_hash, %device_id, "banner request");
    res.render(String::new());
    Ok(())
}

#[handler]
pub async fn download(res: &mut Response) -> Result<(), AppError> {
    let version = state::cached_release_version().unwrap_or_else(|| "unknown".to_owned());
    let info = UpdateInfo {
        download_url: format!("https://github.com/hishtory-coordinator/hishtory-coordinator/releases/tag/{version}"),
        version,
    };
    res.render(Json(info));
    Ok(())
}

#[handler]
pub async fn feedback(req: &mut Request, res: &mut Response) -> Result<(), AppError> {
    let payload = req.payload().await?;
    let feedback: Feedback = serde_json::from_slice(payload)?;
    tracing::info!(user_id = %feedback.user_id, feedback = %feedback.feedback, "feedback received");
    res.status_code(StatusCode::OK);
    Ok(())
}

#[handler]
pub async fn trigger_cron(res: &mut Response) -> Result<(), AppError> {
    maintainer::run_once(state::adapter().as_ref()).await?;
    res.status_code(StatusCode::OK);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_html_covers_the_five_special_characters() {
        assert_eq!(escape_html(r#"<script>alert('hi & "bye"')</script>"#), "&lt;script&gt;alert(&#39;hi &amp; &quot;bye&quot;&#39;)&lt;/script&gt;");
    }

    #[test]
    fn escape_html_is_a_noop_for_plain_text() {
        assert_eq!(escape_html("upgrade available"), "upgrade available");
    }
}
