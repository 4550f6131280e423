use crate::error::FerryError;

/// Recognized share-link shapes, tried in order; first hit wins.
const ID_MARKERS: [&str; 3] = ["/file/d/", "id=", "/open?id="];

/// Pull the bare file identifier out of a Google Drive share URL.
pub fn extract_file_id(url: &str) -> Result<String, FerryError> {
    ID_MARKERS
        .iter()
        .find_map(|marker| id_after(url, marker))
        .ok_or(FerryError::InvalidShareUrl)
}

fn id_after(url: &str, marker: &str) -> Option<String> {
    let start = url.find(marker)? + marker.len();
    let id: String = url[start..].chars().take_while(is_id_char).collect();
    (!id.is_empty()).then_some(id)
}

fn is_id_char(c: &char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_')
}
