use std::fs;
use std::path::Path;

fn main() {
    println!("cargo:rerun-if-changed=scripts/pre-commit");

    install_pre_commit_hook();
}

/// Copies `scripts/pre-commit` into `.git/hooks` when building in a checkout.
fn install_pre_commit_hook() {
    let src = Path::new("scripts/pre-commit");
    let dst = Path::new(".git/hooks/pre-commit");

    if !src.exists() || !Path::new(".git/hooks").exists() {
        return;
    }

    let wanted = fs::read(src).unwrap_or_default();
    if fs::read(dst).ok().as_deref() == Some(wanted.as_slice()) {
        return;
    }

    if let Err(e) = fs::write(dst, &wanted) {
        println!("cargo:warning=could not install pre-commit hook: {e}");
        return;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(dst, fs::Permissions::from_mode(0o755));
    }

    println!("cargo:warning=installed pre-commit hook (fmt + clippy)");
}
