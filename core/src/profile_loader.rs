//! Profile loader: the current user's profile and personal-site provisioning.

use serde_json::json;

use crate::call::Call;
use crate::error::ApiError;
use crate::odata;
use crate::queryable::{Endpoint, Queryable};
use crate::types::UserProfile;

pub const OWNER_USER_PROFILE_PATH: &str = "_api/sp.userprofiles.profileloader.getowneruserprofile";

#[derive(Debug)]
pub struct ProfileLoader {
    q: Queryable,
}

impl Endpoint for ProfileLoader {
    const DEFAULT_PATH: &'static str = "_api/sp.userprofiles.profileloader.getprofileloader";

    fn from_queryable(queryable: Queryable) -> Self {
        Self { q: queryable }
    }

    fn queryable(&self) -> &Queryable {
        &self.q
    }

    fn queryable_mut(&mut self) -> &mut Queryable {
        &mut self.q
    }
}

impl ProfileLoader {
    /// Queue personal-site creation for up to 200 users by email.
    ///
    /// Always issued immediately, even from a batched loader.
    pub fn create_personal_site_enqueue_bulk<S: AsRef<str>>(
        &self,
        emails: &[S],
    ) -> Result<Call<()>, ApiError> {
        let emails: Vec<&str> = emails.iter().map(|e| e.as_ref()).collect();
        self.q
            .clone_with(Self::from_queryable, Some("createpersonalsiteenqueuebulk"), false)?
            .q
            .post_json(&json!({ "emailIDs": emails }), odata::parse_unit)
    }

    /// Profile of the site collection owner.
    pub fn owner_user_profile(&self) -> Result<Call<UserProfile>, ApiError> {
        let mut owner: ProfileLoader =
            self.q.get_parent(Self::from_queryable, None, OWNER_USER_PROFILE_PATH)?;
        if let Some(batch) = self.q.batch() {
            owner = owner.in_batch(&batch);
        }
        owner.q.post(None, odata::parse_json)
    }

    /// Profile of the current user.
    pub fn user_profile(&self) -> Result<Call<UserProfile>, ApiError> {
        self.q
            .clone_with(Self::from_queryable, Some("getuserprofile"), true)?
            .q
            .post(None, odata::parse_json)
    }

    /// Enqueue creation of the current user's personal site.
    pub fn create_personal_site(&self, interactive_request: bool) -> Result<Call<()>, ApiError> {
        let path = format!("getuserprofile/createpersonalsiteenque({interactive_request})");
        self.q
            .clone_with(Self::from_queryable, Some(&path), true)?
            .q
            .post(None, odata::parse_unit)
    }

    /// Opt the current user in or out of sharing all social data.
    pub fn share_all_social_data(&self, share: bool) -> Result<Call<()>, ApiError> {
        let path = format!("getuserprofile/shareallsocialdata({share})");
        self.q
            .clone_with(Self::from_queryable, Some(&path), true)?
            .q
            .post(None, odata::parse_unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::Batch;
    use crate::http::{HttpMethod, HttpResponse};

    const SITE: &str = "https://contoso.sharepoint.com/sites/dev";

    fn loader() -> ProfileLoader {
        ProfileLoader::new(SITE).unwrap()
    }

    #[test]
    fn default_path_is_profile_loader() {
        assert_eq!(
            loader().url(),
            format!("{SITE}/_api/sp.userprofiles.profileloader.getprofileloader")
        );
    }

    #[test]
    fn enqueue_bulk_posts_email_ids() {
        let call = loader()
            .create_personal_site_enqueue_bulk(&["a@contoso.com", "b@contoso.com"])
            .unwrap();
        let req = call.request().unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(
            req.url,
            format!(
                "{SITE}/_api/sp.userprofiles.profileloader.getprofileloader/createpersonalsiteenqueuebulk"
            )
        );
        let body: serde_json::Value = serde_json::from_slice(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(body, json!({"emailIDs": ["a@contoso.com", "b@contoso.com"]}));
    }

    #[test]
    fn enqueue_bulk_ignores_batch() {
        let batch = Batch::new(SITE);
        let call = loader()
            .in_batch(&batch)
            .create_personal_site_enqueue_bulk(&["a@contoso.com"])
            .unwrap();
        assert!(!call.is_deferred());
        assert!(batch.is_empty());
    }

    #[test]
    fn owner_profile_is_a_sibling_of_the_loader() {
        let call = loader().owner_user_profile().unwrap();
        let req = call.request().unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.url, format!("{SITE}/{OWNER_USER_PROFILE_PATH}"));
        assert!(req.body.is_none());
    }

    #[test]
    fn owner_profile_joins_loader_batch() {
        let batch = Batch::new(SITE);
        let call = loader().in_batch(&batch).owner_user_profile().unwrap();
        assert!(call.is_deferred());
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn user_profile_parses_verbose_response() {
        let call = loader().user_profile().unwrap();
        assert!(call
            .request()
            .unwrap()
            .url
            .ends_with("getprofileloader/getuserprofile"));
        let profile = call
            .parse(HttpResponse::new(
                200,
                r#"{"d":{"AccountName":"alice","PersonalSite":"https://my/alice"}}"#,
            ))
            .unwrap();
        assert_eq!(profile.account_name.as_deref(), Some("alice"));
        assert_eq!(profile.personal_site.as_deref(), Some("https://my/alice"));
    }

    #[test]
    fn create_personal_site_inlines_flag() {
        let call = loader().create_personal_site(true).unwrap();
        assert!(call
            .request()
            .unwrap()
            .url
            .ends_with("getprofileloader/getuserprofile/createpersonalsiteenque(true)"));
        assert!(call.parse(HttpResponse::new(204, "")).is_ok());
    }

    #[test]
    fn share_all_social_data_inlines_flag() {
        let call = loader().share_all_social_data(false).unwrap();
        assert!(call
            .request()
            .unwrap()
            .url
            .ends_with("getprofileloader/getuserprofile/shareallsocialdata(false)"));
    }
}
