use uuid::Uuid;

use lifeline_platform::{Platform, PlatformResult};
use lifeline_types::models::Notification;

use crate::identity::Principal;

/// The caller's notifications, newest first.
pub async fn list<P: Platform>(platform: &P, principal: &Principal) -> PlatformResult<Vec<Notification>> {
    platform.list_notifications(&principal.session).await
}

pub async fn unread_count<P: Platform>(platform: &P, principal: &Principal) -> PlatformResult<usize> {
    Ok(list(platform, principal).await?.iter().filter(|n| !n.is_read).count())
}

pub async fn mark_read<P: Platform>(
    platform: &P,
    principal: &Principal,
    notification_id: Uuid,
) -> PlatformResult<()> {
    platform.mark_notification_read(&principal.session, notification_id).await
}
