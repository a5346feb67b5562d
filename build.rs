//! Build script for Auto Angler
//! Embeds the Windows manifest: reading another process's memory and
//! injecting input into an elevated game window both need administrator rights

fn main() {
    #[cfg(windows)]
    {
        embed_windows_resources();
    }
}

#[cfg(windows)]
fn embed_windows_resources() {
    let mut res = winres::WindowsResource::new();

    res.set_manifest_file("auto-angler.manifest");

    if std::path::Path::new("icons/icon.ico").exists() {
        res.set_icon("icons/icon.ico");
    }

    if let Err(e) = res.compile() {
        eprintln!("Warning: Failed to compile Windows resources: {}", e);
    }
}
