/// Key layout for the per-project Fjall keyspace
///
/// Partition structure:
/// - `records`: doc:{collection}/{id} -> record fields (JSON)
/// - `collections`: col:{collection} -> empty marker

/// Encode a record key: doc:{collection}/{id}
pub fn encode_record_key(collection: &str, id: &str) -> Vec<u8> {
    format!("doc:{}/{}", collection, id).into_bytes()
}

/// Encode a collection scan prefix: doc:{collection}/
pub fn encode_collection_prefix(collection: &str) -> Vec<u8> {
    format!("doc:{}/", collection).into_bytes()
}

/// Decode a record key under a known collection: doc:{collection}/{id} -> id
pub fn decode_record_id(collection: &str, key: &[u8]) -> Option<String> {
    let key_str = std::str::from_utf8(key).ok()?;
    key_str
        .strip_prefix("doc:")?
        .strip_prefix(collection)?
        .strip_prefix('/')
        .map(String::from)
}

/// Encode a collection marker key: col:{collection}
pub fn encode_collection_key(collection: &str) -> Vec<u8> {
    format!("col:{}", collection).into_bytes()
}

/// Decode a collection marker key: col:{collection} -> collection
pub fn decode_collection_key(key: &[u8]) -> Option<String> {
    let key_str = std::str::from_utf8(key).ok()?;
    key_str.strip_prefix("col:").map(String::from)
}

/// Collection names become part of record keys and may not contain '/'
pub fn is_valid_collection_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('/')
}
