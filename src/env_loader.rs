use std::env;
use std::path::{Path, PathBuf};

const DOTENV: &str = ".env";

/// `.env` locations in lookup order: the working directory, then
/// `$DAMWATCH_HOME/damwatch/.env`, then `~/damwatch/.env`.
fn dotenv_candidates(
    cwd: Option<PathBuf>,
    damwatch_home: Option<PathBuf>,
    home_dir: Option<PathBuf>,
) -> Vec<PathBuf> {
    let mut out = Vec::new();
    if let Some(cwd) = cwd {
        out.push(cwd.join(DOTENV));
    }
    for base in [damwatch_home, home_dir].into_iter().flatten() {
        let path = base.join("damwatch").join(DOTENV);
        if !out.contains(&path) {
            out.push(path);
        }
    }
    out
}

fn first_existing(candidates: &[PathBuf]) -> Option<&Path> {
    candidates
        .iter()
        .map(PathBuf::as_path)
        .find(|path| path.is_file())
}

fn process_candidates() -> Vec<PathBuf> {
    dotenv_candidates(
        env::current_dir().ok(),
        env::var_os("DAMWATCH_HOME").map(PathBuf::from),
        dirs::home_dir(),
    )
}

/// The `.env` file this process reads settings from, if any.
pub fn active_dotenv() -> Option<PathBuf> {
    first_existing(&process_candidates()).map(Path::to_path_buf)
}

/// Load the first `.env` found. Variables already set in the environment
/// are not overridden.
pub fn load_dotenv() {
    let candidates = process_candidates();
    if let Some(path) = first_existing(&candidates) {
        let _ = dotenvy::from_path(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn working_directory_is_checked_before_homes() {
        let got = dotenv_candidates(
            Some(PathBuf::from("/srv/job")),
            Some(PathBuf::from("/srv/telemetry")),
            Some(PathBuf::from("/home/operator")),
        );
        assert_eq!(
            got,
            vec![
                PathBuf::from("/srv/job/.env"),
                PathBuf::from("/srv/telemetry/damwatch/.env"),
                PathBuf::from("/home/operator/damwatch/.env"),
            ]
        );
    }

    #[test]
    fn same_home_twice_is_listed_once() {
        let got = dotenv_candidates(
            None,
            Some(PathBuf::from("/home/operator")),
            Some(PathBuf::from("/home/operator")),
        );
        assert_eq!(got, vec![PathBuf::from("/home/operator/damwatch/.env")]);
    }

    #[test]
    fn first_existing_skips_missing_files() {
        let tmp = tempdir().expect("tempdir");
        let home = tmp.path().join("home");
        fs::create_dir_all(home.join("damwatch")).expect("mkdir");
        fs::write(home.join("damwatch/.env"), "DAMWATCH_RETENTION_DAYS=30\n").expect("write");

        let candidates = dotenv_candidates(Some(tmp.path().join("cwd")), None, Some(home.clone()));
        assert_eq!(
            first_existing(&candidates),
            Some(home.join("damwatch/.env").as_path())
        );
    }

    #[test]
    fn nothing_found_without_files() {
        let tmp = tempdir().expect("tempdir");
        let candidates = dotenv_candidates(Some(tmp.path().to_path_buf()), None, None);
        assert_eq!(first_existing(&candidates), None);
    }
}
