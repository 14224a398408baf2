//! Credential lookup from the AWS shared files (`~/.aws/credentials` and
//! `~/.aws/config`), selected by `AWS_PROFILE`.
//!
//! Only static keys are read. SSO, `credential_process` and role assumption
//! entries are skipped.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::Credentials;

const DEFAULT_PROFILE: &str = "default";
const ACCESS_KEY_ID: &str = "aws_access_key_id";
const SECRET_ACCESS_KEY: &str = "aws_secret_access_key";
const SESSION_TOKEN: &str = "aws_session_token";

type Section = HashMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    Credentials,
    Config,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSettings {
    pub name: String,
    /// Set when the profile was named through `AWS_PROFILE`/`AWS_DEFAULT_PROFILE`.
    pub explicit: bool,
    pub credentials_file: Option<PathBuf>,
    pub config_file: Option<PathBuf>,
}

impl ProfileSettings {
    pub(crate) fn from_env_with(
        get_var: &mut impl FnMut(&str) -> Option<String>,
        home: Option<&Path>,
    ) -> Self {
        let named = non_blank(get_var("AWS_PROFILE"))
            .or_else(|| non_blank(get_var("AWS_DEFAULT_PROFILE")));
        let explicit = named.is_some();

        Self {
            name: named.unwrap_or_else(|| DEFAULT_PROFILE.to_string()),
            explicit,
            credentials_file: shared_file_path(
                non_blank(get_var("AWS_SHARED_CREDENTIALS_FILE")),
                home,
                "credentials",
            ),
            config_file: shared_file_path(non_blank(get_var("AWS_CONFIG_FILE")), home, "config"),
        }
    }

    /// Static keys for the selected profile. The credentials file wins over
    /// the config file when both define the profile.
    pub fn load_credentials(&self) -> Result<Option<Credentials>> {
        let sources = [
            (FileKind::Credentials, self.credentials_file.as_deref()),
            (FileKind::Config, self.config_file.as_deref()),
        ];

        for (kind, path) in sources {
            let Some(path) = path else {
                continue;
            };
            let Some(text) = read_optional(path)? else {
                continue;
            };
            let sections = parse_sections(&text, kind);
            if let Some(credentials) = sections.get(&self.name).and_then(credentials_from_section) {
                debug!(
                    profile = %self.name,
                    source = %path.display(),
                    "loaded credentials from shared profile"
                );
                return Ok(Some(credentials));
            }
        }

        Ok(None)
    }
}

fn non_blank(raw: Option<String>) -> Option<String> {
    raw.map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn shared_file_path(raw: Option<String>, home: Option<&Path>, file_name: &str) -> Option<PathBuf> {
    match raw {
        Some(path) => match (path.strip_prefix("~/"), home) {
            (Some(rest), Some(home)) => Some(home.join(rest)),
            _ => Some(PathBuf::from(&path)),
        },
        None => home.map(|home| home.join(".aws").join(file_name)),
    }
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err)
            .with_context(|| format!("Failed to read AWS shared file '{}'", path.display())),
    }
}

fn section_profile_name(header: &str, kind: FileKind) -> Option<String> {
    let header = header.trim();
    match kind {
        FileKind::Credentials => Some(header.to_string()),
        FileKind::Config if header == DEFAULT_PROFILE => Some(header.to_string()),
        FileKind::Config => header
            .strip_prefix("profile")
            .filter(|rest| rest.starts_with(char::is_whitespace))
            .map(|rest| rest.trim().to_string()),
    }
}

fn parse_sections(text: &str, kind: FileKind) -> HashMap<String, Section> {
    let mut sections: HashMap<String, Section> = HashMap::new();
    let mut current: Option<String> = None;

    for raw_line in text.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(header) = line.strip_prefix('[').and_then(|rest| rest.strip_suffix(']')) {
            current = section_profile_name(header, kind);
            if let Some(name) = &current {
                sections.entry(name.clone()).or_default();
            }
            continue;
        }

        // Indented lines belong to nested service blocks such as `s3 =`.
        if raw_line.starts_with(char::is_whitespace) {
            continue;
        }

        let (Some(name), Some((key, value))) = (&current, line.split_once('=')) else {
            continue;
        };
        if let Some(section) = sections.get_mut(name) {
            section.insert(key.trim().to_string(), value.trim().to_string());
        }
    }

    sections
}

fn credentials_from_section(section: &Section) -> Option<Credentials> {
    let value = |key: &str| {
        section
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };

    Some(Credentials {
        access_key_id: value(ACCESS_KEY_ID)?,
        secret_access_key: value(SECRET_ACCESS_KEY)?,
        session_token: value(SESSION_TOKEN),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::fs;
    use std::path::Path;

    use super::{FileKind, ProfileSettings, parse_sections};
    use crate::config::Credentials;

    fn settings_from_pairs(pairs: &[(&str, &str)], home: Option<&Path>) -> ProfileSettings {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        ProfileSettings::from_env_with(&mut |key: &str| vars.get(key).cloned(), home)
    }

    fn write_aws_file(home: &Path, name: &str, contents: &str) {
        let dir = home.join(".aws");
        fs::create_dir_all(&dir).expect("failed to create .aws directory");
        fs::write(dir.join(name), contents).expect("failed to write aws file");
    }

    fn keys(id: &str, secret: &str, token: Option<&str>) -> Credentials {
        Credentials {
            access_key_id: id.to_string(),
            secret_access_key: secret.to_string(),
            session_token: token.map(str::to_string),
        }
    }

    #[test]
    fn settings_default_to_home_files_and_default_profile() {
        let home = Path::new("/home/user");
        let settings = settings_from_pairs(&[], Some(home));

        assert_eq!(settings.name, "default");
        assert!(!settings.explicit);
        assert_eq!(
            settings.credentials_file.as_deref(),
            Some(Path::new("/home/user/.aws/credentials"))
        );
        assert_eq!(
            settings.config_file.as_deref(),
            Some(Path::new("/home/user/.aws/config"))
        );
    }

    #[test]
    fn settings_honor_profile_and_file_overrides() {
        let settings = settings_from_pairs(
            &[
                ("AWS_DEFAULT_PROFILE", "ignored"),
                ("AWS_PROFILE", "dev"),
                ("AWS_SHARED_CREDENTIALS_FILE", "~/creds"),
                ("AWS_CONFIG_FILE", "/etc/aws/config"),
            ],
            Some(Path::new("/home/user")),
        );

        assert_eq!(settings.name, "dev");
        assert!(settings.explicit);
        assert_eq!(
            settings.credentials_file.as_deref(),
            Some(Path::new("/home/user/creds"))
        );
        assert_eq!(
            settings.config_file.as_deref(),
            Some(Path::new("/etc/aws/config"))
        );
    }

    #[test]
    fn settings_without_home_have_no_default_files() {
        let settings = settings_from_pairs(&[], None);
        assert_eq!(settings.credentials_file, None);
        assert_eq!(settings.config_file, None);
    }

    #[test]
    fn parse_sections_skips_comments_and_nested_blocks() {
        let text = "\
# leading comment
[default]
aws_access_key_id = AKIDDEFAULT
; another comment
aws_secret_access_key=secret-default
s3 =
    max_concurrent_requests = 20

[dev]
aws_access_key_id = AKIDDEV
";
        let sections = parse_sections(text, FileKind::Credentials);

        let default = &sections["default"];
        assert_eq!(default["aws_access_key_id"], "AKIDDEFAULT");
        assert_eq!(default["aws_secret_access_key"], "secret-default");
        assert!(!default.contains_key("max_concurrent_requests"));
        assert_eq!(sections["dev"]["aws_access_key_id"], "AKIDDEV");
    }

    #[test]
    fn parse_sections_reads_profile_prefix_in_config_files() {
        let text = "\
[default]
region = us-east-1
[profile dev]
aws_access_key_id = AKIDDEV
[sso-session corp]
sso_region = us-east-1
[profileless]
x = y
";
        let sections = parse_sections(text, FileKind::Config);

        assert!(sections.contains_key("default"));
        assert_eq!(sections["dev"]["aws_access_key_id"], "AKIDDEV");
        assert!(!sections.contains_key("corp"));
        assert!(!sections.contains_key("less"));
        assert_eq!(sections.len(), 2);
    }

    #[test]
    fn load_credentials_reads_default_profile() {
        let home = tempfile::tempdir().expect("failed to create temp home");
        write_aws_file(
            home.path(),
            "credentials",
            "[default]\naws_access_key_id = AKIDDEFAULT\naws_secret_access_key = s3cr3t\naws_session_token = tok\n",
        );

        let creds = settings_from_pairs(&[], Some(home.path()))
            .load_credentials()
            .expect("credentials should load");
        assert_eq!(creds, Some(keys("AKIDDEFAULT", "s3cr3t", Some("tok"))));
    }

    #[test]
    fn load_credentials_uses_named_profile() {
        let home = tempfile::tempdir().expect("failed to create temp home");
        write_aws_file(
            home.path(),
            "credentials",
            "[default]\naws_access_key_id = AKIDDEFAULT\naws_secret_access_key = a\n\
             [dev]\naws_access_key_id = AKIDDEV\naws_secret_access_key = b\n",
        );

        let creds = settings_from_pairs(&[("AWS_PROFILE", "dev")], Some(home.path()))
            .load_credentials()
            .expect("credentials should load");
        assert_eq!(creds, Some(keys("AKIDDEV", "b", None)));
    }

    #[test]
    fn load_credentials_falls_back_to_config_file() {
        let home = tempfile::tempdir().expect("failed to create temp home");
        write_aws_file(
            home.path(),
            "credentials",
            "[other]\naws_access_key_id = X\naws_secret_access_key = Y\n",
        );
        write_aws_file(
            home.path(),
            "config",
            "[profile dev]\nregion = eu-west-1\naws_access_key_id = AKIDCFG\naws_secret_access_key = c\n",
        );

        let creds = settings_from_pairs(&[("AWS_PROFILE", "dev")], Some(home.path()))
            .load_credentials()
            .expect("credentials should load");
        assert_eq!(creds, Some(keys("AKIDCFG", "c", None)));
    }

    #[test]
    fn load_credentials_prefers_credentials_file() {
        let home = tempfile::tempdir().expect("failed to create temp home");
        write_aws_file(
            home.path(),
            "credentials",
            "[default]\naws_access_key_id = FROMCREDS\naws_secret_access_key = a\n",
        );
        write_aws_file(
            home.path(),
            "config",
            "[default]\naws_access_key_id = FROMCONFIG\naws_secret_access_key = b\n",
        );

        let creds = settings_from_pairs(&[], Some(home.path()))
            .load_credentials()
            .expect("credentials should load")
            .expect("credentials should exist");
        assert_eq!(creds.access_key_id, "FROMCREDS");
    }

    #[test]
    fn load_credentials_returns_none_for_missing_files_or_partial_keys() {
        let home = tempfile::tempdir().expect("failed to create temp home");
        let settings = settings_from_pairs(&[], Some(home.path()));
        assert_eq!(settings.load_credentials().expect("lookup should succeed"), None);

        write_aws_file(home.path(), "credentials", "[default]\naws_access_key_id = ONLYID\n");
        assert_eq!(settings.load_credentials().expect("lookup should succeed"), None);
    }

    #[test]
    fn load_credentials_reports_unreadable_files() {
        let home = tempfile::tempdir().expect("failed to create temp home");
        // A directory where a file is expected cannot be read as text.
        fs::create_dir_all(home.path().join(".aws").join("credentials"))
            .expect("failed to create blocking directory");

        let err = settings_from_pairs(&[], Some(home.path()))
            .load_credentials()
            .expect_err("reading a directory should fail");
        assert!(
            format!("{err:#}").contains("Failed to read AWS shared file"),
            "unexpected error: {err:#}"
        );
    }
}
