//! Elevated execution of the provisioning script.
//!
//! Windows goes through a UAC prompt (Start-Process -Verb RunAs), Linux
//! through pkexec and macOS through osascript's administrator privileges.

use std::path::Path;

use tokio::process::Command;

use super::{scripts::OsFamily, InstallError};

/// Exit code PowerShell reports when the UAC prompt is declined.
const WINDOWS_UAC_CANCELLED: i32 = 1223;

/// pkexec exit codes for a dismissed dialog / missing authorization.
const PKEXEC_DISMISSED: i32 = 126;
const PKEXEC_NOT_AUTHORIZED: i32 = 127;

/// Builds the elevated command that runs the provisioning script with the
/// log path, local data folder and version tag as arguments.
pub fn elevated_command(
    family: OsFamily,
    script_path: &Path,
    log_path: &Path,
    data_dir: &Path,
    version: &str,
) -> Command {
    match family {
        OsFamily::Windows => {
            // Start-Process throws when the user declines the UAC prompt, so
            // the wrapper maps that to the documented cancellation code.
            let inner = format!(
                "try {{ $p = Start-Process -FilePath 'powershell.exe' -ArgumentList \
                 '-ExecutionPolicy','Bypass','-File','\"{script}\"',\
                 '-LogFilePath','\"{log}\"','-AppLocalFolder','\"{data}\"',\
                 '-LatestVersion','\"{version}\"' -Verb RunAs -Wait -PassThru; \
                 exit $p.ExitCode }} catch {{ exit {cancelled} }}",
                script = script_path.display(),
                log = log_path.display(),
                data = data_dir.display(),
                version = version,
                cancelled = WINDOWS_UAC_CANCELLED,
            );
            let mut cmd = Command::new("powershell.exe");
            cmd.args(["-NoProfile", "-Command", &inner]);
            cmd
        }
        OsFamily::Linux => {
            let mut cmd = Command::new("pkexec");
            cmd.arg(script_path).arg(log_path).arg(data_dir).arg(version);
            cmd
        }
        OsFamily::MacOs => {
            let shell_line = format!(
                "\\\"{}\\\" \\\"{}\\\" \\\"{}\\\" \\\"{}\\\"",
                script_path.display(),
                log_path.display(),
                data_dir.display(),
                version,
            );
            let mut cmd = Command::new("osascript");
            cmd.arg("-e").arg(format!(
                "do shell script \"{shell_line}\" with administrator privileges"
            ));
            cmd
        }
    }
}

/// Maps the elevated shell's exit code to the install failure taxonomy.
pub fn classify_exit(family: OsFamily, code: Option<i32>) -> Result<(), InstallError> {
    match (family, code) {
        (_, Some(0)) => Ok(()),
        (OsFamily::Windows, Some(WINDOWS_UAC_CANCELLED)) => Err(InstallError::UserCancelled),
        (OsFamily::Linux, Some(PKEXEC_DISMISSED | PKEXEC_NOT_AUTHORIZED)) => {
            Err(InstallError::UserCancelled)
        }
        (_, Some(code)) => Err(InstallError::ScriptFailed(code)),
        (_, None) => Err(InstallError::ScriptTerminated),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_exit_is_success() {
        assert!(classify_exit(OsFamily::Linux, Some(0)).is_ok());
        assert!(classify_exit(OsFamily::Windows, Some(0)).is_ok());
    }

    #[test]
    fn uac_cancel_is_reported_distinctly() {
        assert!(matches!(
            classify_exit(OsFamily::Windows, Some(1223)),
            Err(InstallError::UserCancelled)
        ));
        // The same code on Linux is just a script failure.
        assert!(matches!(
            classify_exit(OsFamily::Linux, Some(1223)),
            Err(InstallError::ScriptFailed(1223))
        ));
    }

    #[test]
    fn pkexec_dismissal_is_user_cancelled() {
        assert!(matches!(
            classify_exit(OsFamily::Linux, Some(126)),
            Err(InstallError::UserCancelled)
        ));
        assert!(matches!(
            classify_exit(OsFamily::Linux, Some(127)),
            Err(InstallError::UserCancelled)
        ));
    }

    #[test]
    fn other_codes_are_generic_failures() {
        assert!(matches!(
            classify_exit(OsFamily::MacOs, Some(2)),
            Err(InstallError::ScriptFailed(2))
        ));
        assert!(matches!(
            classify_exit(OsFamily::Linux, None),
            Err(InstallError::ScriptTerminated)
        ));
    }
}
