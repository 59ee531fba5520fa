//! The authorization matrix. Rules are evaluated top to bottom, first match
//! wins, and the default is deny.

use redress_types::models::Actor;
use uuid::Uuid;

/// Actions an actor can attempt. `Escalate` is authorized like any other
/// status mutation but kept distinct so callers can gate it separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    View,
    Create,
    UpdateStatus,
    Assign,
    Message,
    Escalate,
    ManageUsers,
}

/// The complaint facts the matrix needs. Deliberately minimal so the caller
/// can build it from any storage representation.
#[derive(Debug, Clone, Copy)]
pub struct ComplaintAccess {
    pub owner: Uuid,
    pub is_anonymous: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(&'static str),
}

impl Decision {
    pub fn is_allow(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    pub fn reason(&self) -> Option<&'static str> {
        match self {
            Decision::Allow => None,
            Decision::Deny(reason) => Some(reason),
        }
    }
}

/// Decide whether `actor` may perform `action`, optionally against a
/// specific complaint.
///
/// Owners may never transition, assign, or escalate their own complaint,
/// whatever other roles they hold — self-resolution is the one rule that
/// outranks role membership.
pub fn authorize(actor: &Actor, action: Action, complaint: Option<&ComplaintAccess>) -> Decision {
    match action {
        Action::ManageUsers => {
            if actor.is_admin() {
                Decision::Allow
            } else {
                Decision::Deny("insufficient role")
            }
        }
        Action::View | Action::Message => match complaint {
            Some(c) if c.owner == actor.id => Decision::Allow,
            Some(_) if actor.is_staff_tier() => Decision::Allow,
            Some(_) => Decision::Deny("insufficient role"),
            // Listing/creating message-capable views without a target is a
            // caller bug; deny rather than guess.
            None => Decision::Deny("no target complaint"),
        },
        Action::Create => Decision::Allow,
        Action::UpdateStatus | Action::Assign | Action::Escalate => {
            if let Some(c) = complaint {
                if c.owner == actor.id {
                    return Decision::Deny("owner may not transition own complaint");
                }
            }
            if actor.is_staff_tier() {
                Decision::Allow
            } else {
                Decision::Deny("insufficient role")
            }
        }
    }
}

/// Anonymity projection: whether `actor` may see the owner identity fields
/// of `complaint`. The owner always sees their own identity; everyone else
/// is redacted once the complaint is anonymous, staff tiers included.
pub fn can_see_reporter(actor: &Actor, complaint: &ComplaintAccess) -> bool {
    !complaint.is_anonymous || complaint.owner == actor.id
}

#[cfg(test)]
mod tests {
    use super::*;
    use redress_types::models::Role;

    fn actor(roles: &[Role]) -> Actor {
        Actor::new(Uuid::new_v4(), roles.iter().copied())
    }

    fn complaint_of(owner: Uuid) -> ComplaintAccess {
        ComplaintAccess {
            owner,
            is_anonymous: false,
        }
    }

    #[test]
    fn manage_users_is_admin_only() {
        assert!(authorize(&actor(&[Role::Admin]), Action::ManageUsers, None).is_allow());
        for r in [Role::Student, Role::Staff, Role::Hod, Role::Grc] {
            assert!(!authorize(&actor(&[r]), Action::ManageUsers, None).is_allow());
        }
    }

    #[test]
    fn owner_and_staff_tier_can_view_and_message() {
        let owner = actor(&[Role::Student]);
        let c = complaint_of(owner.id);

        assert!(authorize(&owner, Action::View, Some(&c)).is_allow());
        assert!(authorize(&owner, Action::Message, Some(&c)).is_allow());

        for r in [Role::Staff, Role::Hod, Role::Admin, Role::Grc] {
            assert!(authorize(&actor(&[r]), Action::View, Some(&c)).is_allow());
        }

        let stranger = actor(&[Role::Student]);
        assert_eq!(
            authorize(&stranger, Action::View, Some(&c)),
            Decision::Deny("insufficient role")
        );
    }

    #[test]
    fn create_is_open_to_any_authenticated_actor() {
        assert!(authorize(&actor(&[Role::Student]), Action::Create, None).is_allow());
        assert!(authorize(&actor(&[Role::Staff]), Action::Create, None).is_allow());
    }

    #[test]
    fn status_mutations_require_staff_tier() {
        let c = complaint_of(Uuid::new_v4());
        for action in [Action::UpdateStatus, Action::Assign, Action::Escalate] {
            assert!(!authorize(&actor(&[Role::Student]), action, Some(&c)).is_allow());
            assert!(authorize(&actor(&[Role::Staff]), action, Some(&c)).is_allow());
            assert!(authorize(&actor(&[Role::Grc]), action, Some(&c)).is_allow());
        }
    }

    #[test]
    fn owner_never_transitions_own_complaint_regardless_of_roles() {
        // Even an admin who happens to own the complaint is blocked.
        let owner = actor(&[Role::Admin, Role::Staff]);
        let c = complaint_of(owner.id);
        for action in [Action::UpdateStatus, Action::Assign, Action::Escalate] {
            assert_eq!(
                authorize(&owner, action, Some(&c)),
                Decision::Deny("owner may not transition own complaint")
            );
        }
    }

    #[test]
    fn reporter_projection_redacts_anonymous_for_everyone_but_the_owner() {
        let owner = actor(&[Role::Student]);
        let anon = ComplaintAccess {
            owner: owner.id,
            is_anonymous: true,
        };

        assert!(can_see_reporter(&owner, &anon));
        assert!(!can_see_reporter(&actor(&[Role::Staff]), &anon));
        assert!(!can_see_reporter(&actor(&[Role::Admin]), &anon));

        let open = ComplaintAccess {
            owner: owner.id,
            is_anonymous: false,
        };
        assert!(can_see_reporter(&actor(&[Role::Staff]), &open));
    }
}
