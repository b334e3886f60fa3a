use assert_cmd::assert::Assert;
use assert_cmd::Command;
use assert_fs::prelude::{FileWriteStr, PathChild};
use assert_fs::TempDir;
use std::os::unix::fs::PermissionsExt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Stands in for the real `sam` CLI. It echoes its arguments, and fails
/// depending on the template name it was given.
const FAKE_SAM: &str = r#"#!/bin/sh
echo "sam $*"
for arg in "$@"; do
  case "$arg" in
    *invalid*) echo "Error: $arg is invalid" >&2; exit 1 ;;
    *exit-5*) echo "Error: $arg failed with 5" >&2; exit 5 ;;
    *slow*) sleep 10 ;;
    *multi*)
      for n in 1 2 3; do
        echo "$arg out $n"
        echo "$arg err $n" >&2
      done ;;
  esac
done
exit 0
"#;

pub struct SamValidateTestHelper<'a> {
    pub work_dir: TempDir,
    name: &'a str,
    counter: AtomicUsize,
}

impl<'a> SamValidateTestHelper<'a> {
    pub fn new(name: &'a str) -> Self {
        let work_dir = TempDir::new().unwrap();
        std::fs::create_dir_all(work_dir.path().join("bin")).unwrap();
        let sam = work_dir.child("bin/sam");
        sam.write_str(FAKE_SAM).unwrap();
        std::fs::set_permissions(sam.path(), std::fs::Permissions::from_mode(0o755)).unwrap();

        Self {
            work_dir,
            name,
            counter: AtomicUsize::new(0),
        }
    }

    fn search_path(&self) -> String {
        format!(
            "{}:/usr/bin:/bin",
            self.work_dir.child("bin").path().display()
        )
    }

    pub fn run_command(&self, args: &[&str]) -> Assert {
        let mut cmd = Command::cargo_bin("sam-validate").unwrap();
        cmd.current_dir(self.work_dir.path())
            .env(
                "SAM_VALIDATE_RUN_ID",
                format!(
                    "{}-{}",
                    self.name,
                    self.counter.fetch_add(1, Ordering::Relaxed)
                ),
            )
            .env("PATH", self.search_path())
            .env("SAM_VALIDATE_OUTPUT_PROGRESS", "plain")
            .env("NO_COLOR", "1")
            .env_remove("SAM_VALIDATE_MAX_CONCURRENCY")
            .env_remove("SAM_VALIDATE_SAM_BINARY")
            .env_remove("SAM_VALIDATE_TIMEOUT")
            .args(args)
            .assert()
    }

    pub fn clean_work_dir(self) {
        self.work_dir.close().unwrap();
    }
}
