#![allow(dead_code)]

use std::{
    fs,
    path::{Path, PathBuf},
};

pub fn data_path(fname: &str) -> PathBuf {
    Path::new("./tests/data").join(fname)
}

fn env_var_non_empty(name: &str) -> bool {
    std::env::var(name).map(|v| !v.is_empty()).unwrap_or(false)
}

fn test_temp_dir_path() -> PathBuf {
    let tmpdir = std::env::temp_dir();

    let make_file_path = |val| {
        let fname = format!("brokerage-import-test-{}-{}", std::process::id(), val);
        tmpdir.join(fname)
    };

    for val in 1..1000000 {
        let path = make_file_path(val);
        if !path.exists() {
            return path;
        }
    }
    panic!("Could not create temp directory path that does not already exist");
}

// A temp directory path, which is removed (if it was created) on drop.
pub struct NonAutoCreatingTestDir {
    pub path: PathBuf,
}

impl NonAutoCreatingTestDir {
    pub fn new() -> NonAutoCreatingTestDir {
        NonAutoCreatingTestDir { path: test_temp_dir_path() }
    }
}

fn cleanup_test_dir(path: &PathBuf) {
    if path.exists() {
        let skip_env_var = "SKIP_TEMP_DIR_CLEANUP_ON_FAIL";
        let skip_del_on_fail = env_var_non_empty(skip_env_var);

        if std::thread::panicking() && skip_del_on_fail {
            println!("cleanup_test_dir: panicking. Skipping remove of {}",
                     path.display());
        } else {
            println!("cleanup_test_dir: removing {}. To skip cleanup, set {}",
                     path.display(), skip_env_var);
            let _ = fs::remove_dir_all(path);
        }
    } else {
        println!("cleanup_test_dir: {} did not exist", path.display());
    }
}

impl Drop for NonAutoCreatingTestDir {
    fn drop(&mut self) {
        cleanup_test_dir(&self.path);
    }
}
