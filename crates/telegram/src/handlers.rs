use teloxide::types::{MediaKind, Message, MessageKind};

use vaultbot_channels::{Attachment, EventKind, InboundEvent};

/// Convert a Telegram message into a channel event.
///
/// Returns `None` for service messages (joins, pins, ...), which never reach
/// the handler chains.
pub fn inbound_event(msg: &Message) -> Option<InboundEvent> {
    let MessageKind::Common(common) = &msg.kind else {
        return None;
    };

    let kind = match &common.media_kind {
        MediaKind::Text(t) => EventKind::from_text(&t.text),
        media => EventKind::File {
            attachment: extract_attachment(media),
            caption: extract_caption(media),
        },
    };

    Some(InboundEvent {
        chat_id: msg.chat.id.0.to_string(),
        kind,
    })
}

/// Extract the downloadable payload, if the media kind has one.
fn extract_attachment(media: &MediaKind) -> Option<Attachment> {
    let attachment = match media {
        MediaKind::Document(d) => Attachment::Document {
            file_id: d.document.file.id.clone(),
            mime_type: d.document.mime_type.as_ref().map(ToString::to_string),
        },
        MediaKind::Animation(a) => Attachment::Animation {
            file_id: a.animation.file.id.clone(),
            mime_type: a.animation.mime_type.as_ref().map(ToString::to_string),
        },
        MediaKind::Audio(a) => Attachment::Audio {
            file_id: a.audio.file.id.clone(),
            mime_type: a.audio.mime_type.as_ref().map(ToString::to_string),
        },
        // Sizes are ordered smallest first.
        MediaKind::Photo(p) => Attachment::Photo {
            file_id: p.photo.last()?.file.id.clone(),
        },
        MediaKind::Video(v) => Attachment::Video {
            file_id: v.video.file.id.clone(),
            mime_type: v.video.mime_type.as_ref().map(ToString::to_string),
        },
        MediaKind::Voice(v) => Attachment::Voice {
            file_id: v.voice.file.id.clone(),
            mime_type: v.voice.mime_type.as_ref().map(ToString::to_string),
        },
        MediaKind::VideoNote(v) => Attachment::VideoNote {
            file_id: v.video_note.file.id.clone(),
        },
        _ => return None,
    };
    Some(attachment)
}

fn extract_caption(media: &MediaKind) -> Option<String> {
    match media {
        MediaKind::Photo(p) => p.caption.clone(),
        MediaKind::Document(d) => d.caption.clone(),
        MediaKind::Audio(a) => a.caption.clone(),
        MediaKind::Voice(v) => v.caption.clone(),
        MediaKind::Video(vid) => vid.caption.clone(),
        MediaKind::Animation(a) => a.caption.clone(),
        _ => None,
    }
}
