//! Disk I/O and artifact lifecycle.
//!
//! Preallocates `.part` files (fallocate on Linux when available, else
//! set_len), supports concurrent positional writes from chunk workers,
//! finalizes by atomic rename, and owns per-job scratch directories whose
//! contents are removed on every exit path.

mod builder;
mod reader;
mod scratch;
mod writer;

pub use builder::StorageWriterBuilder;
pub use reader::ChunkReader;
pub use scratch::ScratchDir;
pub use writer::StorageWriter;

/// Temporary file suffix used before atomic rename.
pub const TEMP_SUFFIX: &str = ".part";

/// Path for the temp file: appends `.part` to the final path (e.g. `source.mp4` → `source.mp4.part`).
pub fn temp_path(final_path: &std::path::Path) -> std::path::PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(TEMP_SUFFIX);
    std::path::PathBuf::from(o)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::path::Path;

    #[test]
    fn temp_path_appends_part() {
        let p = temp_path(Path::new("source.mp4"));
        assert_eq!(p.to_string_lossy(), "source.mp4.part");
        let p2 = temp_path(Path::new("/tmp/job-1/source.bin"));
        assert_eq!(p2.to_string_lossy(), "/tmp/job-1/source.bin.part");
    }

    #[test]
    fn preallocated_out_of_order_writes_finalize() {
        let dir = tempfile::tempdir().unwrap();
        let final_path = dir.path().join("source.mp4");
        let tp = temp_path(&final_path);

        let mut builder = StorageWriterBuilder::create(&tp).unwrap();
        builder.preallocate(30).unwrap();
        let writer = builder.build();
        assert_eq!(std::fs::metadata(&tp).unwrap().len(), 30);

        let w2 = writer.clone();
        w2.write_at(20, b"cccccccccc").unwrap();
        writer.write_at(0, b"aaaaaaaaaa").unwrap();
        w2.write_at(10, b"bbbbbbbbbb").unwrap();
        writer.sync().unwrap();
        writer.finalize(&final_path).unwrap();

        assert!(!tp.exists());
        let mut buf = Vec::new();
        std::fs::File::open(&final_path)
            .unwrap()
            .read_to_end(&mut buf)
            .unwrap();
        assert_eq!(buf, b"aaaaaaaaaabbbbbbbbbbcccccccccc");
    }

    #[test]
    fn discard_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let tp = temp_path(&dir.path().join("source.mp4"));
        let mut builder = StorageWriterBuilder::create(&tp).unwrap();
        builder.preallocate(10).unwrap();
        let writer = builder.build();
        writer.write_at(0, b"xx").unwrap();
        writer.discard();
        assert!(!tp.exists());
    }
}
