use super::xml::{parse_info, parse_list, parse_log};
use super::{FileContent, LogEntry, PathInfo, Repository};
use crate::error::{ConnectionError, HarvestError, RepositoryError};
use crate::types::{Credentials, NodeKind, Protocol, RepositoryAddress};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Diagnostics meaning "no such node at that revision"
const NOT_FOUND_CODES: [&str; 8] = [
    "E160013", "W160013", "E170000", "W170000", "E200009", "E195012", "E195017", "W200017",
];

/// Diagnostics meaning the repository itself cannot be reached or refuses us
const CONNECTION_CODES: [&str; 9] = [
    "E170001", "E170013", "E175002", "E180001", "E210002", "E215004", "E731001", "E000111",
    "E120108",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Diagnostic {
    NotFound,
    Connection,
    Authentication,
    Other,
}

fn classify(stderr: &str) -> Diagnostic {
    if stderr.contains("E170001") || stderr.contains("E215004") {
        Diagnostic::Authentication
    } else if CONNECTION_CODES.iter().any(|code| stderr.contains(code)) {
        Diagnostic::Connection
    } else if NOT_FOUND_CODES.iter().any(|code| stderr.contains(code)) {
        Diagnostic::NotFound
    } else {
        Diagnostic::Other
    }
}

/// Escape the characters svn would otherwise misread inside a URL path
fn escape_path(path: &str) -> String {
    let mut escaped = String::with_capacity(path.len());
    for c in path.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            ' ' => escaped.push_str("%20"),
            '#' => escaped.push_str("%23"),
            '?' => escaped.push_str("%3F"),
            _ => escaped.push(c),
        }
    }
    escaped
}

struct SvnOutput {
    success: bool,
    stdout: Vec<u8>,
    stderr: String,
}

/// Connector that drives the `svn` command-line client
///
/// Works for every access scheme the installed client supports. Credentials
/// are only passed to network schemes, and never cached by the client.
pub struct SvnCommandRepository {
    address: RepositoryAddress,
    credentials: Option<Credentials>,
    program: PathBuf,
    root_url: String,
    uuid: String,
}

impl SvnCommandRepository {
    /// Open `address` with the `svn` binary found on `PATH`
    pub fn open(
        address: &RepositoryAddress,
        credentials: Option<&Credentials>,
    ) -> Result<Self, HarvestError> {
        Self::open_with_program(address, credentials, "svn")
    }

    /// Open `address` with a specific `svn` binary
    pub fn open_with_program(
        address: &RepositoryAddress,
        credentials: Option<&Credentials>,
        program: impl Into<PathBuf>,
    ) -> Result<Self, HarvestError> {
        let mut repo = Self {
            address: address.clone(),
            credentials: match address.protocol() {
                Protocol::Local => None,
                Protocol::Network { .. } => credentials.cloned(),
            },
            program: program.into(),
            root_url: String::new(),
            uuid: String::new(),
        };

        let location = address.url();
        let output = repo.run(&["info", "--xml", &location])?;
        if !output.success {
            return Err(repo.connection_error(&output.stderr).into());
        }

        let entry = parse_info(&output.stdout)?
            .into_iter()
            .next()
            .ok_or_else(|| RepositoryError::ParseFailed {
                command: "info".to_string(),
                reason: format!("no entry for {}", location),
            })?;
        repo.root_url = entry
            .root
            .unwrap_or(location)
            .trim_end_matches('/')
            .to_string();
        repo.uuid = entry.uuid.unwrap_or_default();

        tracing::debug!("Repository Root: {}", repo.root_url);
        tracing::debug!("Repository UUID: {}", repo.uuid);
        tracing::debug!("Repository HEAD Revision: {}", entry.revision);

        Ok(repo)
    }

    pub fn root_url(&self) -> &str {
        &self.root_url
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// URL of `path` pinned at `revision` with a peg revision
    fn target(&self, path: &str, revision: u64) -> String {
        let base = if path.starts_with('/') {
            format!("{}{}", self.root_url, escape_path(path))
        } else if path.is_empty() {
            self.address.url()
        } else {
            format!("{}/{}", self.address.url(), escape_path(path))
        };
        format!("{}@{}", base, revision)
    }

    /// Build the invocation; a password is never placed on the command line
    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(args).arg("--non-interactive");
        if let Some(creds) = &self.credentials {
            cmd.args(["--no-auth-cache", "--username", creds.login.as_str()]);
            if creds.password.is_some() {
                cmd.arg("--password-from-stdin");
            }
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    fn run(&self, args: &[&str]) -> Result<SvnOutput, HarvestError> {
        let password = self
            .credentials
            .as_ref()
            .and_then(|creds| creds.password.as_deref());
        let mut cmd = self.command(args);
        if password.is_some() {
            cmd.stdin(Stdio::piped());
        }

        tracing::debug!("Running svn {}", args.join(" "));

        let unavailable = |e: std::io::Error| {
            ConnectionError::ClientUnavailable(format!("{}: {}", self.program.display(), e))
        };
        let mut child = cmd.spawn().map_err(unavailable)?;
        if let Some(password) = password
            && let Some(mut stdin) = child.stdin.take()
        {
            // svn may exit before reading; its stderr then explains why
            if let Err(e) = writeln!(stdin, "{}", password) {
                tracing::debug!("Could not pass password to svn: {}", e);
            }
        }
        let output = child.wait_with_output().map_err(unavailable)?;

        Ok(SvnOutput {
            success: output.status.success(),
            stdout: output.stdout,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    fn connection_error(&self, stderr: &str) -> ConnectionError {
        let url = self.address.url();
        match classify(stderr) {
            Diagnostic::Authentication => ConnectionError::AuthenticationFailed {
                url,
                reason: stderr.to_string(),
            },
            _ => ConnectionError::Unreachable {
                url,
                reason: stderr.to_string(),
            },
        }
    }

    /// Map a failed command: `Ok(())` when the target simply does not exist
    fn failure(&self, command: &str, output: &SvnOutput) -> Result<(), HarvestError> {
        match classify(&output.stderr) {
            Diagnostic::NotFound => Ok(()),
            Diagnostic::Connection | Diagnostic::Authentication => {
                Err(self.connection_error(&output.stderr).into())
            }
            Diagnostic::Other => Err(RepositoryError::CommandFailed {
                command: command.to_string(),
                stderr: output.stderr.clone(),
            }
            .into()),
        }
    }

    fn file_size(&self, target: &str) -> Result<Option<u64>, HarvestError> {
        let output = self.run(&["list", "--xml", target])?;
        if !output.success {
            self.failure("list", &output)?;
            return Ok(None);
        }
        Ok(parse_list(&output.stdout)?
            .into_iter()
            .find(|entry| entry.kind == NodeKind::File)
            .and_then(|entry| entry.size))
    }

    fn mime_type(&self, target: &str) -> Result<Option<String>, HarvestError> {
        let output = self.run(&["propget", "svn:mime-type", target])?;
        if !output.success {
            self.failure("propget", &output)?;
            return Ok(None);
        }
        let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(if value.is_empty() { None } else { Some(value) })
    }
}

impl Repository for SvnCommandRepository {
    fn location(&self) -> &RepositoryAddress {
        &self.address
    }

    fn latest_revision(&self) -> Result<u64, HarvestError> {
        let output = self.run(&["info", "--xml", "-r", "HEAD", &self.root_url])?;
        if !output.success {
            self.failure("info", &output)?;
            return Err(RepositoryError::CommandFailed {
                command: "info".to_string(),
                stderr: output.stderr,
            }
            .into());
        }
        parse_info(&output.stdout)?
            .first()
            .map(|entry| entry.revision)
            .ok_or_else(|| {
                RepositoryError::ParseFailed {
                    command: "info".to_string(),
                    reason: "no entry for repository root".to_string(),
                }
                .into()
            })
    }

    fn path_info(&self, path: &str, revision: u64) -> Result<Option<PathInfo>, HarvestError> {
        let target = self.target(path, revision);
        let output = self.run(&["info", "--xml", &target])?;
        if !output.success {
            self.failure("info", &output)?;
            return Ok(None);
        }

        let Some(entry) = parse_info(&output.stdout)?.into_iter().next() else {
            return Ok(None);
        };
        let size = match entry.kind {
            NodeKind::File => self.file_size(&target)?,
            _ => None,
        };

        Ok(Some(PathInfo {
            path: path.to_string(),
            kind: entry.kind,
            size,
            last_changed_revision: entry.last_changed_revision.unwrap_or(revision),
        }))
    }

    fn file_content(
        &self,
        path: &str,
        revision: u64,
    ) -> Result<Option<FileContent>, HarvestError> {
        let target = self.target(path, revision);
        let output = self.run(&["cat", &target])?;
        if !output.success {
            self.failure("cat", &output)?;
            return Ok(None);
        }
        let bytes = output.stdout;
        let mime_type = self.mime_type(&target)?;
        Ok(Some(FileContent { bytes, mime_type }))
    }

    fn log_entries(
        &self,
        path: &str,
        start: u64,
        end: u64,
    ) -> Result<Vec<LogEntry>, HarvestError> {
        let target = self.target(path, end);
        let range = format!("{}:{}", start, end);
        let output = self.run(&["log", "--xml", "-v", "-r", &range, &target])?;
        if !output.success {
            self.failure("log", &output)?;
            return Ok(Vec::new());
        }
        Ok(parse_log(&output.stdout)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_not_found() {
        let stderr = "svn: warning: W170000: URL 'file:///r/sub' non-existent in revision 5\n\
                      svn: E200009: Could not display info for all targets because some targets don't exist";
        assert_eq!(classify(stderr), Diagnostic::NotFound);
        assert_eq!(
            classify("svn: E160013: '/sub' path not found"),
            Diagnostic::NotFound
        );
    }

    #[test]
    fn test_classify_connection() {
        let stderr = "svn: E170013: Unable to connect to a repository at URL 'file:///nope'\n\
                      svn: E180001: Unable to open an ra_local session to URL";
        assert_eq!(classify(stderr), Diagnostic::Connection);
        assert_eq!(
            classify("svn: E215004: No more credentials or we tried too many times."),
            Diagnostic::Authentication
        );
    }

    #[test]
    fn test_classify_other() {
        assert_eq!(
            classify("svn: E160006: No such revision 99"),
            Diagnostic::Other
        );
    }

    #[test]
    fn test_escape_path() {
        assert_eq!(escape_path("/trunk/a b#1?.txt"), "/trunk/a%20b%231%3F.txt");
        assert_eq!(escape_path("/100%.txt"), "/100%25.txt");
    }

    #[test]
    fn test_missing_client_is_connection_error() {
        let address = RepositoryAddress::parse("file:///nonexistent/repo").unwrap();
        let err = SvnCommandRepository::open_with_program(
            &address,
            None,
            "/nonexistent/bin/svn-harvest-missing-svn",
        )
        .err()
        .unwrap();
        assert!(matches!(
            err,
            HarvestError::Connection(ConnectionError::ClientUnavailable(_))
        ));
    }

    #[test]
    fn test_password_stays_off_the_command_line() {
        let address = RepositoryAddress::parse("https://svn.example.org/repo").unwrap();
        let repo = SvnCommandRepository {
            address,
            credentials: Some(Credentials::new("alice", Some("s3cret".to_string()))),
            program: PathBuf::from("svn"),
            root_url: "https://svn.example.org/repo".to_string(),
            uuid: String::new(),
        };

        let cmd = repo.command(&["info", "--xml", "https://svn.example.org/repo@1"]);
        let args: Vec<String> = cmd
            .get_args()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect();

        assert!(args.iter().all(|arg| !arg.contains("s3cret")));
        assert!(!args.contains(&"--password".to_string()));
        assert!(args.contains(&"--password-from-stdin".to_string()));
        assert!(args.contains(&"alice".to_string()));
        assert!(args.contains(&"--no-auth-cache".to_string()));
    }
}
