#![cfg(unix)]

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use tempfile::TempDir;
use watchtags::{WatchService, WatchServiceBuilder};

const WAIT_TIME: Duration = Duration::from_millis(200);
const DEADLINE: Duration = Duration::from_secs(10);

/// Poll `cond` until it holds or the deadline passes.
fn wait_for(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + DEADLINE;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(25));
    }
    cond()
}

/// Several dispatcher cycles.
fn settle() {
    thread::sleep(WAIT_TIME * 5);
}

/// A command that appends a line to `counter` for every run and writes a
/// one-line index naming the root.
fn counting_command(counter: &Path) -> String {
    format!("echo run >> '{}'; printf 'main\\t%s\\n'", counter.display())
}

fn runs(counter: &Path) -> usize {
    fs::read_to_string(counter)
        .map(|s| s.lines().count())
        .unwrap_or(0)
}

fn start(builder: WatchServiceBuilder) {
    let service = builder.wait_time(WAIT_TIME).build().unwrap();
    thread::spawn(move || service.run());
}

struct Fixture {
    _temp: TempDir,
    root: PathBuf,
    counter: PathBuf,
}

fn fixture(dirs: &[&str]) -> Fixture {
    let temp = TempDir::new().unwrap();
    let base = temp.path().canonicalize().unwrap();
    let root = base.join("project");
    fs::create_dir(&root).unwrap();
    for dir in dirs {
        fs::create_dir_all(root.join(dir)).unwrap();
    }
    Fixture {
        _temp: temp,
        counter: base.join("runs.log"),
        root,
    }
}

#[test]
fn test_nested_change_rebuilds_tags() {
    let fx = fixture(&["a/b"]);
    start(
        WatchService::builder()
            .root(&fx.root)
            .command(counting_command(&fx.counter)),
    );

    fs::write(fx.root.join("a/b/lib.c"), "int x;\n").unwrap();

    let tags = fx.root.join("tags");
    assert!(wait_for(|| tags.exists()), "tags never written");
    assert_eq!(
        fs::read_to_string(&tags).unwrap(),
        format!("main\t{}\n", fx.root.display())
    );

    settle();
    assert_eq!(runs(&fx.counter), 1, "one change must index its root once");
}

#[test]
fn test_own_output_does_not_retrigger() {
    let fx = fixture(&["src"]);
    start(
        WatchService::builder()
            .root(&fx.root)
            .command(counting_command(&fx.counter)),
    );

    fs::write(fx.root.join("src/main.c"), "int main;\n").unwrap();
    assert!(wait_for(|| fx.root.join("tags").exists()));

    settle();
    let after_first = runs(&fx.counter);
    assert_eq!(after_first, 1);

    // Installing tags and its staging file must not cause another run.
    settle();
    assert_eq!(runs(&fx.counter), after_first);

    // Touching tags by hand is ignored as well.
    fs::write(fx.root.join("tags"), "edited\n").unwrap();
    settle();
    assert_eq!(runs(&fx.counter), after_first);
}

#[test]
fn test_new_directory_is_watched() {
    let fx = fixture(&["a"]);
    start(
        WatchService::builder()
            .root(&fx.root)
            .command(counting_command(&fx.counter)),
    );

    fs::create_dir(fx.root.join("a/c")).unwrap();
    fs::write(fx.root.join("a/c/fresh.c"), "int fresh;\n").unwrap();
    assert!(wait_for(|| runs(&fx.counter) >= 1));
    settle();
    let before = runs(&fx.counter);

    // Only visible if a/c got its own watch.
    fs::write(fx.root.join("a/c/later.c"), "int later;\n").unwrap();
    assert!(
        wait_for(|| runs(&fx.counter) > before),
        "change inside the new directory was missed"
    );
}

#[test]
fn test_deep_mkdir_is_watched() {
    let fx = fixture(&[]);
    start(
        WatchService::builder()
            .root(&fx.root)
            .command(counting_command(&fx.counter)),
    );

    fs::create_dir_all(fx.root.join("x/y/z")).unwrap();
    assert!(wait_for(|| runs(&fx.counter) >= 1));
    settle();
    let before = runs(&fx.counter);

    fs::write(fx.root.join("x/y/z/deep.c"), "int deep;\n").unwrap();
    assert!(wait_for(|| runs(&fx.counter) > before));
}

#[test]
fn test_only_changed_root_is_indexed() {
    let fx = fixture(&[]);
    let other = fx.root.parent().unwrap().join("other");
    fs::create_dir(&other).unwrap();

    start(
        WatchService::builder()
            .roots([&fx.root, &other])
            .command(counting_command(&fx.counter)),
    );

    fs::write(other.join("only.c"), "int only;\n").unwrap();
    assert!(wait_for(|| other.join("tags").exists()));
    settle();

    assert!(!fx.root.join("tags").exists());
}

#[test]
fn test_dot_directories_are_ignored() {
    let fx = fixture(&[".git/objects"]);
    start(
        WatchService::builder()
            .root(&fx.root)
            .command(counting_command(&fx.counter)),
    );

    fs::write(fx.root.join(".git/objects/pack"), "blob").unwrap();
    settle();
    assert_eq!(runs(&fx.counter), 0);
}

#[test]
fn test_index_on_start_indexes_every_root() {
    let fx = fixture(&[]);
    let other = fx.root.parent().unwrap().join("other");
    fs::create_dir(&other).unwrap();

    start(
        WatchService::builder()
            .roots([&fx.root, &other])
            .command(counting_command(&fx.counter))
            .index_on_start(true),
    );

    assert!(wait_for(|| fx.root.join("tags").exists() && other.join("tags").exists()));
    assert_eq!(runs(&fx.counter), 2);
}

#[test]
fn test_custom_output_name() {
    let fx = fixture(&[]);
    start(
        WatchService::builder()
            .root(&fx.root)
            .command(counting_command(&fx.counter))
            .output_name("TAGS"),
    );

    fs::write(fx.root.join("main.c"), "int main;\n").unwrap();
    assert!(wait_for(|| fx.root.join("TAGS").exists()));
    settle();
    let after_first = runs(&fx.counter);

    settle();
    assert_eq!(runs(&fx.counter), after_first);
    assert!(!fx.root.join("tags").exists());
}
