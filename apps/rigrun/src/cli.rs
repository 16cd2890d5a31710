//! Command-line interface.

use std::path::PathBuf;

use clap::Parser;

/// Pushes test artifacts to a test host and attaches to the live run.
#[derive(Parser, Debug)]
#[command(name = "rigrun")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the test suite directory
    #[arg(short, long)]
    pub suite: PathBuf,

    /// Path to the configuration file
    #[arg(short, long)]
    pub config: PathBuf,

    /// Path to the unconfigured OS image
    #[arg(short, long)]
    pub image: PathBuf,

    /// Working directory (default: a `run` directory under the system tmpdir)
    #[arg(short, long)]
    pub workdir: Option<PathBuf>,

    /// Test host, `hostname` or `hostname:port`
    #[arg(short, long, env = "RIGRUN_URL", default_value = "localhost")]
    pub url: String,

    /// Entry name to skip when hashing and packaging the suite (repeatable;
    /// defaults to dependency and lock artifacts)
    #[arg(short = 'x', long = "exclude")]
    pub excludes: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_required_paths() {
        let args = Args::parse_from([
            "rigrun", "--suite", "/s", "--config", "/c.json", "--image", "/i.img",
        ]);
        assert_eq!(args.suite, PathBuf::from("/s"));
        assert_eq!(args.config, PathBuf::from("/c.json"));
        assert_eq!(args.image, PathBuf::from("/i.img"));
        assert_eq!(args.url, "localhost");
        assert!(args.workdir.is_none());
        assert!(args.excludes.is_empty());
    }

    #[test]
    fn parses_overrides() {
        let args = Args::parse_from([
            "rigrun", "-s", "/s", "-c", "/c", "-i", "/i", "-u", "rig.local:8080", "-w", "/tmp/w",
            "-x", "target", "-x", ".git",
        ]);
        assert_eq!(args.url, "rig.local:8080");
        assert_eq!(args.workdir, Some(PathBuf::from("/tmp/w")));
        assert_eq!(args.excludes, vec!["target".to_string(), ".git".to_string()]);
    }
}
