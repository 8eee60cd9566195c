//! Test doubles: a scriptable stand-in for the package-manager tool

use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;
use helmgate_core::Layout;

use crate::tool::HelmTool;

/// Build a `.tgz` from `(path, content)` file entries
pub(crate) fn build_archive(files: &[(&str, &str)]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);
        header.set_cksum();
        builder
            .append_data(&mut header, path, content.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// Shell script standing in for the tool
///
/// Every invocation is appended to a log. `pull` copies a fixture archive
/// into `--destination` (charts named `missing` fail). Other commands answer
/// from canned responses keyed by `"<arg1>"` or `"<arg1>-<arg2>"`.
pub(crate) struct FakeHelm {
    root: PathBuf,
}

impl FakeHelm {
    pub(crate) fn new(root: &Path, archive: &[u8]) -> Self {
        let root = root.to_path_buf();
        let responses = root.join("responses");
        std::fs::create_dir_all(&responses).unwrap();
        std::fs::write(root.join("chart.tgz"), archive).unwrap();

        let script = format!(
            r#"#!/bin/sh
printf '%s\n' "$*" >> "{log}"
for key in "$1-$2" "$1"; do
  if [ -f "{resp}/$key.out" ] || [ -f "{resp}/$key.code" ]; then
    [ -f "{resp}/$key.out" ] && cat "{resp}/$key.out"
    [ -f "{resp}/$key.err" ] && cat "{resp}/$key.err" >&2
    code=0
    [ -f "{resp}/$key.code" ] && code=$(cat "{resp}/$key.code")
    exit "$code"
  fi
done
case "$1" in
  pull)
    ref="$2"; shift 2
    while [ $# -gt 0 ]; do
      case "$1" in
        --version) ver="$2"; shift 2 ;;
        --destination) dest="$2"; shift 2 ;;
        *) shift ;;
      esac
    done
    name="${{ref##*/}}"
    if [ "$name" = "missing" ]; then
      echo "Error: chart \"missing\" version \"$ver\" not found" >&2
      exit 1
    fi
    cp "{archive}" "$dest/$name-$ver.tgz"
    ;;
esac
exit 0
"#,
            log = root.join("calls.log").display(),
            resp = responses.display(),
            archive = root.join("chart.tgz").display(),
        );
        std::fs::write(root.join("helm.sh"), script).unwrap();

        Self { root }
    }

    /// Tool running the script through `/bin/sh`
    pub(crate) fn tool(&self) -> HelmTool {
        HelmTool::new(
            self.root.join("helm.sh").to_string_lossy(),
            Layout::new(self.root.join("work")),
        )
        .with_wrapper(vec!["/bin/sh".to_string()])
    }

    pub(crate) fn respond(&self, key: &str, stdout: &str) {
        std::fs::write(self.root.join("responses").join(format!("{key}.out")), stdout).unwrap();
    }

    pub(crate) fn respond_with_stderr(&self, key: &str, stdout: &str, stderr: &str) {
        self.respond(key, stdout);
        std::fs::write(self.root.join("responses").join(format!("{key}.err")), stderr).unwrap();
    }

    pub(crate) fn fail(&self, key: &str, stderr: &str, code: i32) {
        let dir = self.root.join("responses");
        std::fs::write(dir.join(format!("{key}.err")), stderr).unwrap();
        std::fs::write(dir.join(format!("{key}.code")), code.to_string()).unwrap();
    }

    /// Every recorded invocation, one argument string per call
    pub(crate) fn calls(&self) -> Vec<String> {
        std::fs::read_to_string(self.root.join("calls.log"))
            .unwrap_or_default()
            .lines()
            .map(String::from)
            .collect()
    }

    /// Number of invocations whose first argument is `command`
    pub(crate) fn count(&self, command: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.split_whitespace().next() == Some(command))
            .count()
    }
}
