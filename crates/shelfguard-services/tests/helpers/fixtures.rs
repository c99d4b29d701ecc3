//! Sample file bodies.

pub fn epub_bytes(seed: u8) -> Vec<u8> {
    let mut body = b"PK\x03\x04mimetypeapplication/epub+zip".to_vec();
    body.extend(std::iter::repeat(seed).take(512));
    body
}

pub fn pdf_bytes(seed: u8) -> Vec<u8> {
    let mut body = b"%PDF-1.7\n".to_vec();
    body.extend(std::iter::repeat(seed).take(256));
    body
}
