//! Deploy scripts run after issuance
//!
//! 🚀 A cert record may carry a shell script. `{cert}` and `{key}` are
//! replaced with the PEM chain and private key, the result is written to a
//! private temporary file and run with `sh`. The file is removed afterwards.

use crate::error::{Error, Result};
use certflow_acme::Certificate;
use std::io::Write;
use std::time::Duration;
use tokio::process::Command;

/// Expand the `{cert}` and `{key}` placeholders
pub fn render_script(script: &str, certificate: &Certificate) -> String {
    script
        .replace("{cert}", &certificate.chain_pem)
        .replace("{key}", &certificate.private_key_pem)
}

/// Run a cert's deploy script, failing on a non-zero exit
pub async fn run_deploy_script(
    cert_id: &str,
    script: &str,
    certificate: &Certificate,
    timeout: Duration,
) -> Result<()> {
    let rendered = render_script(script, certificate);

    // NamedTempFile is created 0600 and unlinked on drop
    let mut file = tempfile::Builder::new()
        .prefix("certflow-deploy-")
        .suffix(".sh")
        .tempfile()?;
    file.write_all(rendered.as_bytes())?;
    file.flush()?;

    tracing::info!("🚀 Running deploy script for cert '{}'", cert_id);

    let mut command = Command::new("sh");
    command.arg(file.path()).kill_on_drop(true);

    let output = tokio::time::timeout(timeout, command.output())
        .await
        .map_err(|_| Error::Deploy {
            cert_id: cert_id.to_string(),
            message: format!("timed out after {}s", timeout.as_secs()),
        })??;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        tracing::error!("❌ Deploy script for cert '{}' exited with {}", cert_id, output.status);
        return Err(Error::Deploy {
            cert_id: cert_id.to_string(),
            message: format!("exited with {}: {}", output.status, stderr),
        });
    }

    tracing::debug!("✅ Deploy script for cert '{}' finished", cert_id);
    Ok(())
}
