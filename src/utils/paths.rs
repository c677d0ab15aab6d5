//! On-disk layout helpers.
//!
//! Item ids and record keys are caller-controlled strings, so they are
//! form-urlencoded before being used as file names or key segments. The
//! encoding is reversible and leaves neither `/` nor `.` in the result, so
//! no id can name a parent or the current directory.

use std::path::{Path, PathBuf};
use url::Url;

/// Name of the directory holding one sub-directory per item.
pub const ITEMS_DIR: &str = "items";
/// Name of the directory holding the default file store.
pub const RECORDS_DIR: &str = "records";

/// Encode an arbitrary string into a single path or key segment.
pub fn encode_segment(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes())
        .map(|part| part.replace('.', "%2E"))
        .collect()
}

/// Reverse [`encode_segment`].
pub fn decode_segment(value: &str) -> String {
    form_urlencoded::parse(value.as_bytes())
        .map(|(key, val)| [key, val].concat())
        .collect()
}

/// Directory holding every item's chunk files.
pub fn items_dir(storage_path: &Path) -> PathBuf {
    storage_path.join(ITEMS_DIR)
}

/// Directory holding the chunk files of one item.
pub fn item_dir(storage_path: &Path, id: &str) -> PathBuf {
    items_dir(storage_path).join(encode_segment(id))
}

/// Destination of a chunk file.
///
/// The extension of the remote URL's last path segment is kept so that
/// players can sniff the container; chunks without one get `.seg`.
pub fn chunk_path(storage_path: &Path, id: &str, index: u32, url: &Url) -> PathBuf {
    let extension = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or("seg");
    item_dir(storage_path, id).join(format!("{:06}.{}", index, extension))
}

/// Temporary path a chunk is written to before being moved into place.
pub fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_round_trip() {
        for value in ["plain", "a/b", "with space", "100%", "a+b=c&d", "ünï"] {
            let encoded = encode_segment(value);
            assert!(!encoded.contains('/'));
            assert_eq!(decode_segment(&encoded), value);
        }
    }

    #[test]
    fn test_dot_ids_stay_inside_items_dir() {
        let root = Path::new("/data");
        for id in [".", "..", "...", "a.b"] {
            let dir = item_dir(root, id);
            assert_eq!(dir.parent(), Some(items_dir(root).as_path()));
            let name = dir.file_name().and_then(|n| n.to_str()).unwrap();
            assert!(!name.contains('.'));
            assert_eq!(decode_segment(name), id);
        }
        assert_eq!(item_dir(root, ".."), PathBuf::from("/data/items/%2E%2E"));
    }

    #[test]
    fn test_chunk_path_keeps_extension() {
        let root = Path::new("/data");
        let url = Url::parse("https://cdn.example.com/v/seg-3.ts?token=x").unwrap();
        assert_eq!(
            chunk_path(root, "movie", 3, &url),
            PathBuf::from("/data/items/movie/000003.ts")
        );
    }

    #[test]
    fn test_chunk_path_default_extension() {
        let root = Path::new("/data");
        let url = Url::parse("https://cdn.example.com/segment").unwrap();
        assert_eq!(
            chunk_path(root, "a/b", 0, &url),
            PathBuf::from("/data/items/a%2Fb/000000.seg")
        );
    }

    #[test]
    fn test_partial_path() {
        assert_eq!(
            partial_path(Path::new("/data/000001.ts")),
            PathBuf::from("/data/000001.ts.part")
        );
    }
}
