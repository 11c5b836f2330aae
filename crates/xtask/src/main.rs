use std::env;
use std::path::{Path, PathBuf};
use std::process::{exit, Command};

const BINARIES: &[&str] = &["regcheck-server", "regcheck-mcp"];

fn main() {
    let args: Vec<String> = env::args().collect();
    let task = args.get(1).map(|s| s.as_str()).unwrap_or("");

    let result = match task {
        "dist" => dist(),
        _ => {
            eprintln!("Usage: cargo run -p xtask -- dist");
            exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("xtask {task}: {e}");
        exit(1);
    }
}

/// Build release binaries and copy them to `dist/<host-triple>/`.
fn dist() -> Result<(), String> {
    let root = workspace_root()?;
    let triple = host_triple()?;
    let out_dir = root.join("dist").join(&triple);
    std::fs::create_dir_all(&out_dir)
        .map_err(|e| format!("create {}: {e}", out_dir.display()))?;

    let mut cmd = Command::new(env::var("CARGO").unwrap_or_else(|_| "cargo".to_string()));
    cmd.current_dir(&root).args(["build", "--release"]);
    for bin in BINARIES {
        cmd.args(["-p", bin]);
    }
    println!("Building {} for {triple}...", BINARIES.join(", "));
    let status = cmd.status().map_err(|e| format!("run cargo build: {e}"))?;
    if !status.success() {
        return Err(format!("cargo build exited with {status}"));
    }

    for bin in BINARIES {
        let name = exe_name(bin);
        copy(
            &root.join("target").join("release").join(&name),
            &out_dir.join(&name),
        )?;
    }
    println!("Binaries copied to {}", out_dir.display());
    Ok(())
}

fn exe_name(bin: &str) -> String {
    if cfg!(windows) {
        format!("{bin}.exe")
    } else {
        bin.to_string()
    }
}

fn copy(src: &Path, dst: &Path) -> Result<(), String> {
    std::fs::copy(src, dst)
        .map(|_| ())
        .map_err(|e| format!("copy {} -> {}: {e}", src.display(), dst.display()))
}

fn host_triple() -> Result<String, String> {
    // `rustc --print host-tuple` is stable since 1.84
    if let Ok(out) = Command::new("rustc").args(["--print", "host-tuple"]).output() {
        if out.status.success() {
            let triple = String::from_utf8_lossy(&out.stdout).trim().to_string();
            if !triple.is_empty() {
                return Ok(triple);
            }
        }
    }

    let out = Command::new("rustc")
        .arg("-vV")
        .output()
        .map_err(|e| format!("run rustc: {e}"))?;
    String::from_utf8_lossy(&out.stdout)
        .lines()
        .find_map(|line| line.strip_prefix("host: "))
        .map(str::to_string)
        .ok_or_else(|| "could not determine host triple from rustc -vV".to_string())
}

fn workspace_root() -> Result<PathBuf, String> {
    let mut dir = env::current_dir().map_err(|e| format!("no current dir: {e}"))?;
    loop {
        let manifest = dir.join("Cargo.toml");
        if let Ok(contents) = std::fs::read_to_string(&manifest) {
            if contents.contains("[workspace]") {
                return Ok(dir);
            }
        }
        if !dir.pop() {
            return Err("could not find workspace root".to_string());
        }
    }
}
