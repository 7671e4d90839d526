/// Application name
pub const APP_NAME: &str = "Convo";

/// Header carrying the caller identity, set by the upstream auth layer
pub const IDENTITY_HEADER: &str = "x-user-id";

/// Query parameter carrying the identity on WebSocket upgrade
pub const IDENTITY_QUERY_PARAM: &str = "userId";

/// Default HTTP API port
pub const DEFAULT_HTTP_PORT: u16 = 5000;

/// Maximum size of a single attachment in bytes (20 MiB)
pub const MAX_ATTACHMENT_SIZE: usize = 20 * 1024 * 1024;

/// Maximum number of attachments per message
pub const MAX_ATTACHMENTS: usize = 10;

/// Characters of message text kept in a notification preview
pub const PREVIEW_MAX_CHARS: usize = 100;

/// Preview shown for a message that carries only attachments
pub const ATTACHMENT_PREVIEW: &str = "[Attachment]";

/// Media types accepted as attachments.
pub const ALLOWED_MEDIA_TYPES: &[&str] = &[
    // Images
    "image/jpeg",
    "image/png",
    "image/webp",
    "image/gif",
    "image/avif",
    // Video
    "video/mp4",
    "video/webm",
    "video/ogg",
    // Audio
    "audio/mpeg",
    "audio/ogg",
    "audio/wav",
    // Documents
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "application/vnd.ms-powerpoint",
    "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    "text/plain",
    "text/csv",
    // Archives
    "application/zip",
    "application/x-zip-compressed",
    "application/x-rar-compressed",
    "application/x-7z-compressed",
    // Browsers send this for unknown types
    "application/octet-stream",
];

/// Whether `media_type` may be attached to a message.
pub fn is_allowed_media_type(media_type: &str) -> bool {
    ALLOWED_MEDIA_TYPES.contains(&media_type)
}
