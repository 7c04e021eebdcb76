//! Hygiene: coding standards enforced at test time.
//!
//! Scans the library source tree (test files excluded) for antipatterns.
//! Every budget is zero. The budget never grows.

use std::fs;
use std::path::Path;

struct SourceFile {
    path: String,
    content: String,
}

struct Budget {
    pattern: &'static str,
    max: usize,
    why: &'static str,
}

// Panics.
const UNWRAP: Budget = Budget { pattern: ".unwrap()", max: 0, why: "propagate or handle the error" };
const EXPECT: Budget = Budget { pattern: ".expect(", max: 0, why: "propagate or handle the error" };
const PANIC: Budget = Budget { pattern: "panic!(", max: 0, why: "return an error instead" };
const UNREACHABLE: Budget = Budget { pattern: "unreachable!(", max: 0, why: "restructure the match" };
const TODO: Budget = Budget { pattern: "todo!(", max: 0, why: "finish the stub" };
const UNIMPLEMENTED: Budget = Budget { pattern: "unimplemented!(", max: 0, why: "finish the stub" };

// Silent loss.
const SILENT_DISCARD: Budget = Budget { pattern: "let _ =", max: 0, why: "inspect or log the result" };
const DOT_OK: Budget = Budget { pattern: ".ok()", max: 0, why: "inspect or log the error" };

// Structure.
const ALLOW_DEAD_CODE: Budget = Budget { pattern: "#[allow(dead_code)]", max: 0, why: "delete the dead code" };
const RAW_BORROW_MUT: Budget = Budget { pattern: ".borrow_mut()", max: 0, why: "use try_borrow_mut and log" };

/// Production `.rs` files under `src/`, excluding `*_test.rs`.
fn source_files() -> Vec<SourceFile> {
    let mut files = Vec::new();
    collect_rs_files(Path::new("src"), &mut files);
    files
}

fn collect_rs_files(dir: &Path, out: &mut Vec<SourceFile>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            let name = path.file_name().unwrap_or_default().to_string_lossy();
            if name == "target" || name == "tests" {
                continue;
            }
            collect_rs_files(&path, out);
        } else if path.extension().is_some_and(|e| e == "rs") {
            let path_str = path.to_string_lossy().to_string();
            if path_str.ends_with("_test.rs") {
                continue;
            }
            if let Ok(content) = fs::read_to_string(&path) {
                out.push(SourceFile { path: path_str, content });
            }
        }
    }
}

fn check(budget: &Budget) {
    let files = source_files();
    assert!(!files.is_empty(), "no sources found; run from the crate root");
    let hits: Vec<(String, usize)> = files
        .iter()
        .filter_map(|file| {
            let count = file.content.lines().filter(|line| line.contains(budget.pattern)).count();
            (count > 0).then(|| (file.path.clone(), count))
        })
        .collect();
    let count: usize = hits.iter().map(|(_, c)| c).sum();
    let listing = hits.iter().map(|(path, c)| format!("  {path}: {c}")).collect::<Vec<_>>().join("\n");
    assert!(
        count <= budget.max,
        "`{}` budget exceeded: found {count}, max {} ({}).\n{listing}",
        budget.pattern,
        budget.max,
        budget.why
    );
}

#[test]
fn unwrap_budget() {
    check(&UNWRAP);
}

#[test]
fn expect_budget() {
    check(&EXPECT);
}

#[test]
fn panic_budget() {
    check(&PANIC);
}

#[test]
fn unreachable_budget() {
    check(&UNREACHABLE);
}

#[test]
fn todo_budget() {
    check(&TODO);
}

#[test]
fn unimplemented_budget() {
    check(&UNIMPLEMENTED);
}

#[test]
fn silent_discard_budget() {
    check(&SILENT_DISCARD);
}

#[test]
fn dot_ok_budget() {
    check(&DOT_OK);
}

#[test]
fn allow_dead_code_budget() {
    check(&ALLOW_DEAD_CODE);
}

#[test]
fn raw_borrow_mut_budget() {
    check(&RAW_BORROW_MUT);
}
