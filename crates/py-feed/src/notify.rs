//! Comment notification planning and best-effort dispatch.

use std::time::Duration;

use tracing::{info, warn};

use py_core::{Comment, CommentNotification, Item, Notifier, FALLBACK_NAME};

/// Decides who hears about `new_comment` on `item`.
///
/// The item author is the main recipient and earlier commenters go to BCC.
/// Without an eligible author, the first eligible commenter becomes the main
/// recipient. Returns `None` when nobody is left to notify.
pub fn plan_comment_notification(
    item: &Item,
    new_comment: &Comment,
    item_url: String,
) -> Option<CommentNotification> {
    let author = item
        .author_email
        .as_deref()
        .filter(|email| !email.is_empty() && item.author_id != new_comment.author_id)
        .map(|email| (email.to_string(), name_or_fallback(&item.author_name)));

    let mut commenters: Vec<(String, String)> = Vec::new();
    for comment in &item.comments {
        let Some(email) = comment.author_email.as_deref().filter(|e| !e.is_empty()) else {
            continue;
        };
        if comment.author_id == item.author_id || comment.author_id == new_comment.author_id {
            continue;
        }
        if commenters.iter().any(|(known, _)| known == email) {
            continue;
        }
        commenters.push((email.to_string(), name_or_fallback(&comment.author_name)));
    }

    let (recipient_email, recipient_name, bcc_emails) = match author {
        Some((email, name)) => (email, name, commenters.into_iter().map(|(e, _)| e).collect()),
        None => {
            let mut rest = commenters.into_iter();
            let (email, name) = rest.next()?;
            (email, name, rest.map(|(e, _)| e).collect())
        }
    };

    Some(CommentNotification {
        recipient_email,
        recipient_name,
        bcc_emails,
        item_name: item.name.clone(),
        item_url,
        comment_author: name_or_fallback(&new_comment.author_name),
        comment_text: new_comment.text.clone(),
    })
}

fn name_or_fallback(name: &str) -> String {
    if name.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        name.to_string()
    }
}

/// Sends the notification within `limit`. Failures are logged, never returned.
pub async fn dispatch(notifier: &dyn Notifier, notification: &CommentNotification, limit: Duration) {
    match tokio::time::timeout(limit, notifier.send_comment_notification(notification)).await {
        Ok(Ok(true)) => info!(
            recipient = %notification.recipient_email,
            bcc = notification.bcc_emails.len(),
            "comment notification sent"
        ),
        Ok(Ok(false)) => warn!(recipient = %notification.recipient_email, "comment notification not accepted"),
        Ok(Err(err)) => warn!(error = %err, "comment notification failed"),
        Err(_) => warn!(timeout_ms = limit.as_millis() as u64, "comment notification timed out"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use py_core::{CommentId, ItemId, UserId};

    fn comment(author: &str, email: Option<&str>) -> Comment {
        Comment {
            id: CommentId::generate(),
            text: format!("hola de {author}"),
            author_id: UserId::new(author),
            author_name: author.to_uppercase(),
            author_email: email.map(str::to_string),
            author_photo_url: None,
            is_anonymous: false,
            created_at: Utc::now(),
        }
    }

    fn item(author_email: Option<&str>, comments: Vec<Comment>) -> Item {
        let now = Utc::now();
        Item {
            id: ItemId::new("it"),
            name: "Casco".into(),
            description: String::new(),
            image_url: String::new(),
            location: None,
            item_type: None,
            author_id: UserId::new("owner"),
            author_name: "Dueña".into(),
            author_email: author_email.map(str::to_string),
            author_photo_url: None,
            is_anonymous: false,
            created_at: now,
            posted_at: now,
            updated_at: now,
            likes: vec![],
            comments,
        }
    }

    #[test]
    fn author_is_main_recipient_and_commenters_are_deduplicated_in_bcc() {
        let new = comment("new", Some("new@uni.edu"));
        let it = item(
            Some("owner@uni.edu"),
            vec![
                comment("b", Some("b@uni.edu")),
                comment("owner", Some("owner@uni.edu")),
                comment("b", Some("b@uni.edu")),
                comment("anon", None),
                new.clone(),
            ],
        );

        let plan = plan_comment_notification(&it, &new, "https://py/items/it".into()).unwrap();
        assert_eq!(plan.recipient_email, "owner@uni.edu");
        assert_eq!(plan.recipient_name, "Dueña");
        assert_eq!(plan.bcc_emails, vec!["b@uni.edu".to_string()]);
        assert_eq!(plan.comment_author, "NEW");
        assert_eq!(plan.subject(), "Nuevo comentario en \"Casco\" - PerdidosYa!");
    }

    #[test]
    fn first_commenter_takes_over_when_author_is_not_eligible() {
        let own = comment("owner", Some("owner@uni.edu"));
        let it = item(
            Some("owner@uni.edu"),
            vec![comment("b", Some("b@uni.edu")), comment("c", Some("c@uni.edu"))],
        );

        let plan = plan_comment_notification(&it, &own, "u".into()).unwrap();
        assert_eq!(plan.recipient_email, "b@uni.edu");
        assert_eq!(plan.recipient_name, "B");
        assert_eq!(plan.bcc_emails, vec!["c@uni.edu".to_string()]);
    }

    #[test]
    fn nobody_to_notify() {
        let new = comment("new", Some("new@uni.edu"));
        let it = item(None, vec![new.clone()]);
        assert!(plan_comment_notification(&it, &new, "u".into()).is_none());
    }
}
