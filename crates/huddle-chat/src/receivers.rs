//! Receiver resolution under the active chat privilege.

use tracing::debug;

use huddle_shared::types::{ChatPrivilege, Participant, ReceiverSelection, UserId};
use huddle_shared::{ChatError, Result, ValidationError};

/// Valid receivers for the next message, "Everyone" first.
///
/// Empty when chat is disabled. The local user is never offered.
pub fn receiver_options(
    privilege: ChatPrivilege,
    roster: &[Participant],
    local_user: UserId,
) -> Vec<ReceiverSelection> {
    match privilege {
        ChatPrivilege::NoOne => Vec::new(),
        ChatPrivilege::EveryonePublicly => vec![ReceiverSelection::everyone()],
        ChatPrivilege::All => std::iter::once(ReceiverSelection::everyone())
            .chain(
                roster
                    .iter()
                    .filter(|p| p.user_id != local_user)
                    .map(ReceiverSelection::from),
            )
            .collect(),
    }
}

/// Resolve a requested receiver against privilege and roster.
pub fn resolve_receiver(
    privilege: ChatPrivilege,
    roster: &[Participant],
    requested: Option<UserId>,
) -> Result<ReceiverSelection> {
    if !privilege.allows_chat() {
        return Err(ChatError::ChatDisabled);
    }
    let Some(user_id) = requested else {
        return Ok(ReceiverSelection::everyone());
    };
    if !privilege.allows_direct() {
        debug!(%user_id, "Direct receiver refused under public-only chat");
        return Err(ChatError::DirectMessagesDisabled);
    }
    roster
        .iter()
        .find(|p| p.user_id == user_id)
        .map(ReceiverSelection::from)
        .ok_or(ChatError::UnknownReceiver(user_id))
}

/// The selection that should stand after a privilege or roster change.
///
/// Returns `None` if `current` is still valid.
pub fn normalize_selection(
    privilege: ChatPrivilege,
    roster: &[Participant],
    current: &ReceiverSelection,
) -> Option<ReceiverSelection> {
    let user_id = current.user_id.user()?;
    let still_valid =
        privilege.allows_direct() && roster.iter().any(|p| p.user_id == user_id);
    (!still_valid).then(ReceiverSelection::everyone)
}

/// Reject a send with no text and no attachment.
pub fn validate_outgoing(text: &str, has_file: bool) -> std::result::Result<(), ValidationError> {
    if text.trim().is_empty() && !has_file {
        return Err(ValidationError::EmptyMessage);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use huddle_shared::types::ReceiverId;

    const ME: UserId = UserId(1);

    fn roster() -> Vec<Participant> {
        [(1, "me"), (42, "bob"), (7, "carol")]
            .into_iter()
            .map(|(id, name)| Participant {
                user_id: UserId(id),
                display_name: name.to_string(),
                user_guid: format!("guid-{id}"),
            })
            .collect()
    }

    #[test]
    fn test_all_offers_everyone_and_others() {
        let options = receiver_options(ChatPrivilege::All, &roster(), ME);
        let ids: Vec<_> = options.iter().map(|o| o.user_id).collect();
        assert_eq!(
            ids,
            vec![
                ReceiverId::Everyone,
                ReceiverId::User(UserId(42)),
                ReceiverId::User(UserId(7)),
            ]
        );
        assert_eq!(options[0].name, "Everyone");
        assert_eq!(options[1].user_guid, "guid-42");
    }

    #[test]
    fn test_public_only_offers_everyone() {
        let options = receiver_options(ChatPrivilege::EveryonePublicly, &roster(), ME);
        assert_eq!(options, vec![ReceiverSelection::everyone()]);
    }

    #[test]
    fn test_no_one_offers_nothing() {
        assert!(receiver_options(ChatPrivilege::NoOne, &roster(), ME).is_empty());
    }

    #[test]
    fn test_resolve_receiver() {
        let roster = roster();
        let bob = resolve_receiver(ChatPrivilege::All, &roster, Some(UserId(42))).unwrap();
        assert_eq!(bob.name, "bob");
        assert!(resolve_receiver(ChatPrivilege::All, &roster, None)
            .unwrap()
            .is_everyone());
        assert!(matches!(
            resolve_receiver(ChatPrivilege::All, &roster, Some(UserId(99))),
            Err(ChatError::UnknownReceiver(UserId(99)))
        ));
        assert!(matches!(
            resolve_receiver(ChatPrivilege::EveryonePublicly, &roster, Some(UserId(42))),
            Err(ChatError::DirectMessagesDisabled)
        ));
        assert!(matches!(
            resolve_receiver(ChatPrivilege::NoOne, &roster, None),
            Err(ChatError::ChatDisabled)
        ));
    }

    #[test]
    fn test_normalize_selection() {
        let roster = roster();
        let bob = ReceiverSelection::from(&roster[1]);
        assert_eq!(normalize_selection(ChatPrivilege::All, &roster, &bob), None);
        assert_eq!(
            normalize_selection(ChatPrivilege::EveryonePublicly, &roster, &bob),
            Some(ReceiverSelection::everyone())
        );
        assert_eq!(
            normalize_selection(ChatPrivilege::All, &roster[..1], &bob),
            Some(ReceiverSelection::everyone())
        );
        assert_eq!(
            normalize_selection(ChatPrivilege::NoOne, &roster, &ReceiverSelection::everyone()),
            None
        );
    }

    #[test]
    fn test_validate_outgoing() {
        assert_eq!(validate_outgoing("  \n", false), Err(ValidationError::EmptyMessage));
        assert_eq!(validate_outgoing("", true), Ok(()));
        assert_eq!(validate_outgoing("hi", false), Ok(()));
    }
}
