//! Shared fixtures for pipeline tests

use std::{fs, path::Path};

/// 1x1 transparent GIF.
pub const GIF_PIXEL: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x01, 0x44, 0x00, 0x3b,
];

/// Initialize logging for tests
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// Populate `root` with a small documentation tree:
///
/// ```text
/// index.md             heading, rust code block, local image
/// img/pixel.gif
/// guide/setup.md       unknown-language code block, remote image
/// guide/img/pixel.gif
/// .drafts/wip.md       hidden, never rendered
/// ```
pub fn create_doc_tree(root: &Path) {
    init_logging();
    fs::create_dir_all(root.join("img")).unwrap();
    fs::create_dir_all(root.join("guide").join("img")).unwrap();
    fs::create_dir_all(root.join(".drafts")).unwrap();

    fs::write(
        root.join("index.md"),
        "# Index\n\n```rust\nfn main() {\n    println!(\"<hi>\");\n}\n```\n\n![pixel](img/pixel.gif)\n",
    )
    .unwrap();
    fs::write(root.join("img").join("pixel.gif"), GIF_PIXEL).unwrap();

    fs::write(
        root.join("guide").join("setup.md"),
        "## Setup\n\n```klingon\nQapla' < 1\n```\n\n![logo](https://example.com/logo.png)\n\n![local](img/pixel.gif)\n",
    )
    .unwrap();
    fs::write(root.join("guide").join("img").join("pixel.gif"), GIF_PIXEL).unwrap();

    fs::write(root.join(".drafts").join("wip.md"), "# WIP\n").unwrap();
}

/// Create a named pipe at `path`. Reading it blocks until a writer opens the other end.
#[cfg(unix)]
pub fn make_fifo(path: &Path) {
    let status = std::process::Command::new("mkfifo")
        .arg(path)
        .status()
        .unwrap();
    assert!(status.success(), "mkfifo {path:?} failed");
}

/// Open and close the write end of `fifo`, letting a blocked reader see end of file.
#[cfg(unix)]
pub fn release_fifo(fifo: &Path) {
    drop(fs::OpenOptions::new().write(true).open(fifo).unwrap());
}
