use common_types::{Album, EffectiveRole, Media, Permission};

/// Resolves the role `caller` holds on `album`.
///
/// The album owner is always `Owner`. Otherwise the caller's permission row decides.
/// Without one, signed-in callers are `Contributor` on event albums and have no
/// role anywhere else. Callers that are not signed in never have a role.
#[must_use]
pub fn resolve_role(
    album: &Album,
    caller: Option<&str>,
    permission: Option<&Permission>,
) -> Option<EffectiveRole> {
    let caller = caller?;
    if album.owner_id == caller {
        return Some(EffectiveRole::Owner);
    }
    let explicit = permission
        .filter(|p| p.album_id == album.id && p.user_id == caller)
        .map(|p| EffectiveRole::from(p.role));
    explicit.or(album.is_event.then_some(EffectiveRole::Contributor))
}

/// What one caller may do on one album.
///
/// The same checks drive which actions a UI offers and what `AccessService`
/// lets through, so both always agree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumAccess {
    album_id: String,
    caller: Option<String>,
    is_event: bool,
    role: Option<EffectiveRole>,
}

impl AlbumAccess {
    #[must_use]
    pub fn resolve(album: &Album, caller: Option<&str>, permission: Option<&Permission>) -> Self {
        Self {
            album_id: album.id.clone(),
            caller: caller.map(str::to_owned),
            is_event: album.is_event,
            role: resolve_role(album, caller, permission),
        }
    }

    #[must_use]
    pub const fn role(&self) -> Option<EffectiveRole> {
        self.role
    }

    const fn is_signed_in(&self) -> bool {
        self.caller.is_some()
    }

    const fn is_owner_or_editor(&self) -> bool {
        matches!(self.role, Some(EffectiveRole::Owner | EffectiveRole::Editor))
    }

    const fn is_owner(&self) -> bool {
        matches!(self.role, Some(EffectiveRole::Owner))
    }

    #[must_use]
    pub const fn can_view(&self) -> bool {
        self.role.is_some()
    }

    /// Owners and editors may upload, and on events every signed-in user may.
    #[must_use]
    pub const fn can_upload(&self) -> bool {
        self.is_owner_or_editor() || (self.is_event && self.is_signed_in())
    }

    /// Owners and editors may delete any media of the album. On events, everyone
    /// may delete what they uploaded themselves.
    #[must_use]
    pub fn can_delete_media(&self, media: &Media) -> bool {
        if media.album_id != self.album_id {
            return false;
        }
        self.is_owner_or_editor()
            || (self.is_event && self.caller.as_deref() == Some(media.uploader_id.as_str()))
    }

    #[must_use]
    pub const fn can_manage_permissions(&self) -> bool {
        self.is_owner()
    }

    #[must_use]
    pub const fn can_delete_album(&self) -> bool {
        self.is_owner()
    }

    #[must_use]
    pub const fn can_rename_album(&self) -> bool {
        self.is_owner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common_types::AlbumRole;
    use chrono::Utc;
    use rstest::rstest;

    const OWNER: &str = "owner";
    const MEMBER: &str = "member";
    const STRANGER: &str = "stranger";

    fn album(is_event: bool) -> Album {
        Album {
            id: "a1".to_owned(),
            title: "Holiday".to_owned(),
            description: None,
            owner_id: OWNER.to_owned(),
            is_event,
            created_at: Utc::now(),
        }
    }

    fn permission(user_id: &str, role: AlbumRole) -> Permission {
        Permission {
            album_id: "a1".to_owned(),
            user_id: user_id.to_owned(),
            role,
            granted_at: Utc::now(),
        }
    }

    fn media(uploader: &str) -> Media {
        Media {
            id: format!("m-{uploader}"),
            album_id: "a1".to_owned(),
            url: "https://cdn/photo.jpg".to_owned(),
            filename: "photo.jpg".to_owned(),
            uploader_id: uploader.to_owned(),
            created_at: Utc::now(),
        }
    }

    #[rstest]
    #[case(false, Some(OWNER), None, Some(EffectiveRole::Owner))]
    #[case(false, Some(MEMBER), Some(AlbumRole::Editor), Some(EffectiveRole::Editor))]
    #[case(false, Some(MEMBER), Some(AlbumRole::Viewer), Some(EffectiveRole::Viewer))]
    #[case(false, Some(STRANGER), None, None)]
    #[case(true, Some(STRANGER), None, Some(EffectiveRole::Contributor))]
    #[case(true, Some(MEMBER), Some(AlbumRole::Viewer), Some(EffectiveRole::Viewer))]
    #[case(true, None, None, None)]
    #[case(false, None, None, None)]
    fn resolves_roles(
        #[case] is_event: bool,
        #[case] caller: Option<&str>,
        #[case] stored: Option<AlbumRole>,
        #[case] expected: Option<EffectiveRole>,
    ) {
        let row = caller.zip(stored).map(|(user, role)| permission(user, role));
        assert_eq!(resolve_role(&album(is_event), caller, row.as_ref()), expected);
    }

    #[test]
    fn permission_rows_of_other_users_are_ignored() {
        let row = permission(MEMBER, AlbumRole::Editor);
        assert_eq!(resolve_role(&album(false), Some(STRANGER), Some(&row)), None);
    }

    #[test]
    fn viewer_on_regular_album_can_only_view() {
        let row = permission(MEMBER, AlbumRole::Viewer);
        let access = AlbumAccess::resolve(&album(false), Some(MEMBER), Some(&row));

        assert!(access.can_view());
        assert!(!access.can_upload());
        assert!(!access.can_delete_media(&media(MEMBER)));
        assert!(!access.can_delete_media(&media(OWNER)));
        assert!(!access.can_manage_permissions());
        assert!(!access.can_rename_album());
        assert!(!access.can_delete_album());
    }

    #[test]
    fn editor_can_upload_and_delete_any_media() {
        let row = permission(MEMBER, AlbumRole::Editor);
        let access = AlbumAccess::resolve(&album(false), Some(MEMBER), Some(&row));

        assert!(access.can_upload());
        assert!(access.can_delete_media(&media(OWNER)));
        assert!(!access.can_manage_permissions());
    }

    #[test]
    fn event_contributor_deletes_only_own_uploads() {
        let access = AlbumAccess::resolve(&album(true), Some(STRANGER), None);

        assert_eq!(access.role(), Some(EffectiveRole::Contributor));
        assert!(access.can_view());
        assert!(access.can_upload());
        assert!(access.can_delete_media(&media(STRANGER)));
        assert!(!access.can_delete_media(&media(MEMBER)));
        assert!(!access.can_manage_permissions());
    }

    #[test]
    fn event_viewer_may_still_upload() {
        let row = permission(MEMBER, AlbumRole::Viewer);
        let access = AlbumAccess::resolve(&album(true), Some(MEMBER), Some(&row));

        assert!(access.can_upload());
        assert!(access.can_delete_media(&media(MEMBER)));
        assert!(!access.can_delete_media(&media(OWNER)));
    }

    #[test]
    fn signed_out_caller_gets_nothing_even_on_events() {
        let access = AlbumAccess::resolve(&album(true), None, None);

        assert!(!access.can_view());
        assert!(!access.can_upload());
        assert!(!access.can_delete_media(&media(STRANGER)));
    }

    #[test]
    fn owner_can_do_everything() {
        let access = AlbumAccess::resolve(&album(false), Some(OWNER), None);

        assert!(access.can_view());
        assert!(access.can_upload());
        assert!(access.can_delete_media(&media(MEMBER)));
        assert!(access.can_manage_permissions());
        assert!(access.can_rename_album());
        assert!(access.can_delete_album());
    }

    #[test]
    fn media_of_other_albums_is_never_deletable() {
        let access = AlbumAccess::resolve(&album(false), Some(OWNER), None);
        let mut foreign = media(OWNER);
        foreign.album_id = "a2".to_owned();

        assert!(!access.can_delete_media(&foreign));
    }
}
