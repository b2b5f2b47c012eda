use std::{
    env,
    error::Error,
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
};

use jackc::engine;
use log::{error, info};

static USAGE: &str = "usage: jackc [file.jack | directory]";

fn main() -> ExitCode {
    simple_logger::SimpleLogger::new().env().init().unwrap();

    let mut args = env::args().skip(1);
    let (Some(path), None) = (args.next(), args.next()) else {
        eprintln!("{USAGE}");
        // FreeBSD EX_USAGE (64)
        return ExitCode::from(64);
    };

    let sources = match collect_sources(Path::new(&path)) {
        Ok(sources) => sources,
        Err(e) => {
            error!("{path}: {e}");
            return ExitCode::FAILURE;
        }
    };

    // One file's failure never aborts the rest of the batch.
    let mut failed = false;
    for source in sources {
        match compile_file(&source) {
            Ok(target) => info!("{} -> {}", source.display(), target.display()),
            Err(e) => {
                error!("{}: {e}", source.display());
                failed = true;
            }
        }
    }
    if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// A single `.jack` file, or every `.jack` file directly inside a directory.
fn collect_sources(path: &Path) -> Result<Vec<PathBuf>, Box<dyn Error>> {
    let is_jack = |p: &Path| p.extension().is_some_and(|ext| ext == "jack");

    if path.is_dir() {
        let mut sources = Vec::new();
        for entry in fs::read_dir(path)? {
            let candidate = entry?.path();
            if is_jack(&candidate) {
                sources.push(candidate);
            }
        }
        if sources.is_empty() {
            return Err(format!("no .jack file in {}", path.display()).into());
        }
        sources.sort();
        Ok(sources)
    } else if is_jack(path) {
        Ok(vec![path.to_path_buf()])
    } else {
        Err("a .jack file is required".into())
    }
}

/// Compiles one source file to a sibling `.vm` file. The instruction stream
/// goes through an in-memory buffer and only reaches disk once the whole
/// class compiled, so a failed run leaves no partial output behind.
fn compile_file(source: &Path) -> Result<PathBuf, Box<dyn Error>> {
    let src = fs::read_to_string(source)?;
    let mut out = Vec::with_capacity(4 * 1024);
    engine::compile(&src, &mut out)?;
    let target = source.with_extension("vm");
    fs::write(&target, out)?;
    Ok(target)
}
