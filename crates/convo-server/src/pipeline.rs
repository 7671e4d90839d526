//! Message delivery pipeline.
//!
//! A send moves through validate, authorize, resolve conversation, ingest
//! attachments, persist and deliver. Any stage can fail, and every failure
//! comes back as a [`ServerError`]; nothing is written before authorization
//! passes and nothing is persisted if an attachment upload fails.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use convo_shared::constants::is_allowed_media_type;
use convo_shared::protocol::{Notification, NotificationKind, ServerEvent};
use convo_shared::{Attachment, Message, ReplyPreview, UserId};
use convo_store::Store;

use crate::attachments::{AttachmentStorage, Upload};
use crate::caller::Caller;
use crate::error::ServerError;
use crate::registry::ConnectionRegistry;

/// Everything a client submits with one send.
#[derive(Debug, Default)]
pub struct SendRequest {
    pub receiver: Option<UserId>,
    pub text: String,
    pub reply_to: Option<Uuid>,
    pub reply_preview: Option<ReplyPreview>,
    pub attachments: Vec<Upload>,
}

#[derive(Clone)]
pub struct DeliveryPipeline {
    store: Store,
    registry: ConnectionRegistry,
    storage: Arc<dyn AttachmentStorage>,
    max_attachment_size: usize,
    max_attachments: usize,
}

impl DeliveryPipeline {
    pub fn new(
        store: Store,
        registry: ConnectionRegistry,
        storage: Arc<dyn AttachmentStorage>,
        max_attachment_size: usize,
        max_attachments: usize,
    ) -> Self {
        Self {
            store,
            registry,
            storage,
            max_attachment_size,
            max_attachments,
        }
    }

    pub fn storage_policy(&self) -> &'static str {
        self.storage.policy()
    }

    /// Send one message from `caller`, returning the persisted message.
    pub async fn send(&self, caller: &Caller, request: SendRequest) -> Result<Message, ServerError> {
        let SendRequest {
            receiver,
            text,
            reply_to,
            reply_preview,
            attachments,
        } = request;

        let receiver =
            receiver.ok_or_else(|| ServerError::BadRequest("Missing receiver".to_string()))?;
        let text = text.trim().to_string();
        self.validate(&text, &attachments)?;

        self.authorize(caller, &receiver).await?;

        let conversation = self.store.resolve_conversation(&caller.id, &receiver).await?;

        let attachments = self.ingest(&attachments).await?;

        let now = Utc::now();
        let message = Message {
            id: Uuid::new_v4(),
            conversation_id: conversation.id,
            sender_id: caller.id.clone(),
            receiver_id: receiver,
            message: text,
            attachments,
            reply_to,
            reply_preview,
            edited: false,
            edited_at: None,
            created_at: now,
            updated_at: now,
        };
        let message = self.store.append_message(message).await?;

        info!(
            message = %message.id,
            conversation = %message.conversation_id,
            from = %message.sender_id,
            to = %message.receiver_id,
            attachments = message.attachments.len(),
            "Message persisted"
        );

        self.deliver(&message).await;
        Ok(message)
    }

    /// Ordered messages between `caller` and `counterparty`.
    pub async fn conversation(
        &self,
        caller: &Caller,
        counterparty: &UserId,
    ) -> Result<Vec<Message>, ServerError> {
        Ok(self
            .store
            .conversation_messages(&caller.id, counterparty)
            .await?)
    }

    /// Replace the text of a message. Only its sender may do this; the last
    /// edit to land wins.
    pub async fn edit(&self, caller: &Caller, id: Uuid, text: &str) -> Result<Message, ServerError> {
        let existing = self.store.get_message(id).await?;
        if existing.sender_id != caller.id {
            return Err(ServerError::AuthorizationDenied(
                "Only the sender may edit a message".to_string(),
            ));
        }

        let text = text.trim();
        if text.is_empty() {
            return Err(ServerError::BadRequest("Message text is required".to_string()));
        }

        let updated = self
            .store
            .update_message_text(id, text.to_string(), Utc::now())
            .await?;

        let reached = self
            .registry
            .send_to(
                &updated.receiver_id,
                &[ServerEvent::MessageEdited(updated.clone())],
            )
            .await;
        debug!(message = %updated.id, reached, "Edit delivered");

        Ok(updated)
    }

    fn validate(&self, text: &str, attachments: &[Upload]) -> Result<(), ServerError> {
        if text.is_empty() && attachments.is_empty() {
            return Err(ServerError::BadRequest(
                "Message text or an attachment is required".to_string(),
            ));
        }
        if attachments.len() > self.max_attachments {
            return Err(ServerError::BadRequest(format!(
                "At most {} attachments per message",
                self.max_attachments
            )));
        }
        for upload in attachments {
            if upload.data.len() > self.max_attachment_size {
                return Err(ServerError::AttachmentTooLarge {
                    size: upload.data.len(),
                    max: self.max_attachment_size,
                });
            }
            if !is_allowed_media_type(&upload.media_type) {
                return Err(ServerError::UnsupportedMediaType(upload.media_type.clone()));
            }
        }
        Ok(())
    }

    /// Either side's block stops the send. The caller's list comes from the
    /// request context; the receiver's is read fresh every time.
    async fn authorize(&self, caller: &Caller, receiver: &UserId) -> Result<(), ServerError> {
        if caller.blocked.contains(receiver) {
            return Err(ServerError::AuthorizationDenied(
                "You have blocked this contact".to_string(),
            ));
        }

        let receiver_blocks = self.store.block_list(receiver).await?;
        if receiver_blocks.contains(&caller.id) {
            return Err(ServerError::AuthorizationDenied(
                "Message not delivered".to_string(),
            ));
        }
        Ok(())
    }

    /// Upload every attachment in order; the first failure aborts the send.
    async fn ingest(&self, uploads: &[Upload]) -> Result<Vec<Attachment>, ServerError> {
        let mut stored = Vec::with_capacity(uploads.len());
        for upload in uploads {
            match self.storage.upload(upload).await {
                Ok(attachment) => stored.push(attachment),
                Err(e) => {
                    warn!(
                        file = %upload.file_name,
                        policy = self.storage.policy(),
                        uploaded = stored.len(),
                        error = %e,
                        "Attachment upload failed"
                    );
                    return Err(e.into());
                }
            }
        }
        Ok(stored)
    }

    /// Push the message and its notification to the receiver's live
    /// connections. Offline receivers get nothing.
    async fn deliver(&self, message: &Message) {
        if self.registry.lookup(&message.receiver_id).await.is_empty() {
            debug!(message = %message.id, to = %message.receiver_id, "Receiver offline");
            return;
        }

        let (sender_name, avatar_url) = match self.store.profile(&message.sender_id).await {
            Ok(Some(profile)) => (profile.full_name, profile.profile_photo),
            Ok(None) => (String::new(), String::new()),
            Err(e) => {
                warn!(user = %message.sender_id, error = %e, "Profile lookup failed");
                (String::new(), String::new())
            }
        };

        let notify = ServerEvent::Notify(Notification {
            kind: NotificationKind::Message,
            sender_id: message.sender_id.clone(),
            sender_name,
            avatar_url,
            message_preview: message.preview(),
            timestamp: Utc::now().timestamp_millis(),
        });

        let reached = self
            .registry
            .send_to(
                &message.receiver_id,
                &[ServerEvent::NewMessage(message.clone()), notify],
            )
            .await;
        debug!(message = %message.id, reached, "Message delivered");
    }
}
