/// MIME type assigned to photos, which the provider never labels.
pub const PHOTO_MIME: &str = "image/jpeg";

/// MIME type assigned to round video notes, which the provider never labels.
pub const VIDEO_NOTE_MIME: &str = "video/mp4";

/// A downloadable payload attached to an inbound message.
///
/// The provider attaches at most one payload kind per message. Variants are
/// listed in classification priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attachment {
    Document {
        file_id: String,
        mime_type: Option<String>,
    },
    Animation {
        file_id: String,
        mime_type: Option<String>,
    },
    Audio {
        file_id: String,
        mime_type: Option<String>,
    },
    Photo {
        file_id: String,
    },
    Video {
        file_id: String,
        mime_type: Option<String>,
    },
    Voice {
        file_id: String,
        mime_type: Option<String>,
    },
    VideoNote {
        file_id: String,
    },
}

impl Attachment {
    /// Opaque remote handle used to fetch the payload.
    pub fn file_id(&self) -> &str {
        match self {
            Self::Document { file_id, .. }
            | Self::Animation { file_id, .. }
            | Self::Audio { file_id, .. }
            | Self::Photo { file_id }
            | Self::Video { file_id, .. }
            | Self::Voice { file_id, .. }
            | Self::VideoNote { file_id } => file_id,
        }
    }

    /// Short payload kind name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Document { .. } => "document",
            Self::Animation { .. } => "animation",
            Self::Audio { .. } => "audio",
            Self::Photo { .. } => "photo",
            Self::Video { .. } => "video",
            Self::Voice { .. } => "voice",
            Self::VideoNote { .. } => "video_note",
        }
    }
}

/// Derive the canonical MIME type of an attachment envelope.
///
/// Returns `None` ("unclassifiable") when the envelope carries no supported
/// payload, or when the payload kind relies on a provider-supplied MIME type
/// that is absent or blank.
pub fn classify(attachment: Option<&Attachment>) -> Option<&str> {
    let mime = match attachment? {
        Attachment::Photo { .. } => PHOTO_MIME,
        Attachment::VideoNote { .. } => VIDEO_NOTE_MIME,
        Attachment::Document { mime_type, .. }
        | Attachment::Animation { mime_type, .. }
        | Attachment::Audio { mime_type, .. }
        | Attachment::Video { mime_type, .. }
        | Attachment::Voice { mime_type, .. } => mime_type.as_deref()?,
    };
    (!mime.trim().is_empty()).then_some(mime)
}
