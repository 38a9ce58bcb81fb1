//! Process launching, directly or through WSL.

use tokio::process::Command;

use scanbatch_config::LauncherSettings;

/// How a program is started on the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Launcher {
    /// Start the program itself.
    Direct,
    /// Start it through `wsl --user <user> -- bash -c '<argv>'`.
    Wsl {
        /// Linux user the command runs as.
        user: String,
    },
}

impl From<&LauncherSettings> for Launcher {
    fn from(settings: &LauncherSettings) -> Self {
        match settings {
            LauncherSettings::Direct => Self::Direct,
            LauncherSettings::Wsl { user } => Self::Wsl { user: user.clone() },
        }
    }
}

impl Launcher {
    /// Program and arguments actually executed for `argv`.
    #[must_use]
    pub fn wrap(&self, argv: &[String]) -> Vec<String> {
        match self {
            Self::Direct => argv.to_vec(),
            Self::Wsl { user } => vec![
                "wsl".to_string(),
                "--user".to_string(),
                user.clone(),
                "--".to_string(),
                "bash".to_string(),
                "-c".to_string(),
                shell_join(argv),
            ],
        }
    }

    /// Build a command for `argv`. Output is piped and the child is not killed
    /// when the handle is dropped.
    #[must_use]
    pub fn command(&self, argv: &[String]) -> Option<Command> {
        let wrapped = self.wrap(argv);
        let (program, args) = wrapped.split_first()?;
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(false);
        Some(command)
    }

    /// Whether this launcher goes through WSL.
    #[must_use]
    pub const fn is_wsl(&self) -> bool {
        matches!(self, Self::Wsl { .. })
    }
}

/// Quote every argument for `bash -c`.
#[must_use]
pub fn shell_join(argv: &[String]) -> String {
    argv.iter()
        .map(|arg| shell_quote(arg))
        .collect::<Vec<_>>()
        .join(" ")
}

fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:+,@%".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Decode process output. WSL's own messages are UTF-16LE, recognisable by a
/// NUL in the high byte of most code units; everything else is UTF-8, even when
/// it happens to carry a NUL.
#[must_use]
pub fn decode_output(bytes: &[u8]) -> String {
    if !looks_like_utf16le(bytes) {
        return String::from_utf8_lossy(bytes).into_owned();
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units).replace(['\0', '\u{feff}'], "")
}

fn looks_like_utf16le(bytes: &[u8]) -> bool {
    if bytes.is_empty() || !bytes.len().is_multiple_of(2) {
        return false;
    }
    let units = bytes.len() / 2;
    let high_nuls = bytes.iter().skip(1).step_by(2).filter(|byte| **byte == 0).count();
    high_nuls * 2 >= units
}
