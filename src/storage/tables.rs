use redb::TableDefinition;

/// Lifecycle rows: img_id -> ImageStatusRecord (msgpack)
pub const IMAGE_STATUSES: TableDefinition<&str, &[u8]> = TableDefinition::new("image_statuses");

/// Processed images: img_id -> ImageRecord (msgpack)
pub const IMAGES: TableDefinition<&str, &[u8]> = TableDefinition::new("images");

/// One row per detected face: sequence -> FeatureMappingRecord (msgpack)
pub const FEATURE_MAPPINGS: TableDefinition<u64, &[u8]> = TableDefinition::new("feature_mappings");

/// Symmetric matches: (this_img_id, that_img_id) -> MatchRecord (msgpack).
/// The composite key doubles as the uniqueness constraint on the ordered pair.
pub const MATCHES: TableDefinition<(&str, &str), &[u8]> = TableDefinition::new("matches");

/// Local queue backend: sequence -> QueuedMessage (msgpack)
pub const LOCAL_QUEUE: TableDefinition<u64, &[u8]> = TableDefinition::new("local_queue");
