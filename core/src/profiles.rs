//! People manager: following, tags and profile properties.
//!
//! `UserProfileQuery` is the entry point of the crate. Profile-loader and
//! people-picker operations are reachable from it too; those builders are
//! rooted next to the people manager (at the same site URL) and inherit its
//! batch.

use serde_json::Value;

use crate::call::Call;
use crate::error::ApiError;
use crate::odata;
use crate::people_picker::ClientPeoplePickerQuery;
use crate::profile_loader::ProfileLoader;
use crate::query::quoted_alias;
use crate::queryable::{Endpoint, Queryable};
use crate::types::{
    ClientPeoplePickerQueryParameters, HashTagCollection, MultiValuedProfileProperty,
    PeoplePickerEntity, SingleValueProfileProperty, UserProfile,
};

pub const DEFAULT_FOLLOWED_TAGS: u32 = 20;

#[derive(Debug)]
pub struct UserProfileQuery {
    q: Queryable,
}

impl Endpoint for UserProfileQuery {
    const DEFAULT_PATH: &'static str = "_api/sp.userprofiles.peoplemanager";

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

impl UserProfileQuery {
    fn child(&self, path: &str) -> Result<Queryable, ApiError> {
        Ok(self.q.clone_with(Self::from_queryable, Some(path), true)?.q)
    }

    /// Child at `path` with the `@v` alias bound to `login_name`.
    fn child_for(&self, path: &str, login_name: &str) -> Result<Queryable, ApiError> {
        let mut q = self.child(path)?;
        q.query_mut().set("@v", quoted_alias(login_name));
        Ok(q)
    }

    pub fn profile_loader(&self) -> Result<ProfileLoader, ApiError> {
        let mut loader =
            self.q
                .get_parent(ProfileLoader::from_queryable, None, ProfileLoader::DEFAULT_PATH)?;
        if let Some(batch) = self.q.batch() {
            loader = loader.in_batch(&batch);
        }
        Ok(loader)
    }

    pub fn people_picker(&self) -> Result<ClientPeoplePickerQuery, ApiError> {
        let mut picker = self.q.get_parent(
            ClientPeoplePickerQuery::from_queryable,
            None,
            ClientPeoplePickerQuery::DEFAULT_PATH,
        )?;
        if let Some(batch) = self.q.batch() {
            picker = picker.in_batch(&batch);
        }
        Ok(picker)
    }

    /// URL of the page where the current user edits their profile.
    pub fn edit_profile_link(&self) -> Result<Call<String>, ApiError> {
        self.child("EditProfileLink")?
            .get(|r| odata::parse_scalar(r, "EditProfileLink"))
    }

    /// Whether the current user's followed-people list is public.
    pub fn is_my_people_list_public(&self) -> Result<Call<bool>, ApiError> {
        self.child("IsMyPeopleListPublic")?
            .get(|r| odata::parse_scalar(r, "IsMyPeopleListPublic"))
    }

    /// Whether `login_name` follows the current user.
    pub fn am_i_followed_by(&self, login_name: &str) -> Result<Call<bool>, ApiError> {
        self.child_for("amifollowedby(@v)", login_name)?
            .get(|r| odata::parse_scalar(r, "AmIFollowedBy"))
    }

    /// Follow check for `login_name`.
    ///
    /// Issued against `amifollowedby(@v)`, the path existing callers of this
    /// operation have always hit on the wire.
    pub fn am_i_following(&self, login_name: &str) -> Result<Call<bool>, ApiError> {
        self.child_for("amifollowedby(@v)", login_name)?
            .get(|r| odata::parse_scalar(r, "AmIFollowedBy"))
    }

    /// Tags the current user follows, at most `max_count`
    /// (`DEFAULT_FOLLOWED_TAGS` is what the service uses when unsure).
    pub fn get_followed_tags(&self, max_count: u32) -> Result<Call<Value>, ApiError> {
        self.child(&format!("getfollowedtags({max_count})"))?
            .get(odata::parse_value)
    }

    pub fn get_followers_for(&self, login_name: &str) -> Result<Call<Value>, ApiError> {
        self.child_for("getfollowersfor(@v)", login_name)?
            .get(odata::parse_value)
    }

    pub fn my_followers(&self) -> Result<Call<Value>, ApiError> {
        self.child("getmyfollowers")?.get(odata::parse_value)
    }

    pub fn my_properties(&self) -> Result<Call<Value>, ApiError> {
        self.child("getmyproperties")?.get(odata::parse_value)
    }

    pub fn get_people_followed_by(&self, login_name: &str) -> Result<Call<Value>, ApiError> {
        self.child_for("getpeoplefollowedby(@v)", login_name)?
            .get(odata::parse_value)
    }

    pub fn get_properties_for(&self, login_name: &str) -> Result<Call<Value>, ApiError> {
        self.child_for("getpropertiesfor(@v)", login_name)?
            .get(odata::parse_value)
    }

    /// Most popular tags, through the `.gettrendingtags` static method.
    pub fn trending_tags(&self) -> Result<Call<HashTagCollection>, ApiError> {
        let mut q = self.q.clone_with(Self::from_queryable, None, true)?.q;
        q.concat(".gettrendingtags")?;
        q.get(odata::parse_json)
    }

    /// One profile property of `login_name`. The property name is inlined
    /// into the path; the account goes through `@v`.
    pub fn get_user_profile_property_for(
        &self,
        login_name: &str,
        property_name: &str,
    ) -> Result<Call<String>, ApiError> {
        let path = format!(
            "getuserprofilepropertyfor(accountname=@v, propertyname='{property_name}')"
        );
        self.child_for(&path, login_name)?
            .get(|r| odata::parse_scalar(r, "GetUserProfilePropertyFor"))
    }

    /// Stop suggesting `login_name` to the current user.
    pub fn hide_suggestion(&self, login_name: &str) -> Result<Call<()>, ApiError> {
        self.child_for("hidesuggestion(@v)", login_name)?
            .post(None, odata::parse_unit)
    }

    /// Whether `follower` follows `followee`.
    pub fn is_following(&self, follower: &str, followee: &str) -> Result<Call<bool>, ApiError> {
        let mut q = self.q.clone_with(Self::from_queryable, None, true)?.q;
        q.concat(".isfollowing(possiblefolloweraccountname=@v,possiblefolloweeaccountname=@y)")?;
        q.query_mut()
            .set("@v", quoted_alias(follower))
            .set("@y", quoted_alias(followee));
        q.get(|r| odata::parse_scalar(r, "IsFollowing"))
    }

    /// Upload a new picture for the current user (raw image bytes).
    pub fn set_my_profile_pic(&self, picture: &[u8]) -> Result<Call<()>, ApiError> {
        self.child("setmyprofilepicture")?
            .post(Some(picture.to_vec()), odata::parse_unit)
    }

    pub fn set_single_value_profile_property(
        &self,
        account_name: &str,
        property_name: &str,
        property_value: &str,
    ) -> Result<Call<()>, ApiError> {
        let body = SingleValueProfileProperty {
            account_name: account_name.to_string(),
            property_name: property_name.to_string(),
            property_value: property_value.to_string(),
        };
        self.child("SetSingleValueProfileProperty")?
            .post_json(&body, odata::parse_unit)
    }

    pub fn set_multi_valued_profile_property<S: AsRef<str>>(
        &self,
        account_name: &str,
        property_name: &str,
        property_values: &[S],
    ) -> Result<Call<()>, ApiError> {
        let body = MultiValuedProfileProperty {
            account_name: account_name.to_string(),
            property_name: property_name.to_string(),
            property_values: property_values.iter().map(|v| v.as_ref().to_string()).collect(),
        };
        self.child("SetMultiValuedProfileProperty")?
            .post_json(&body, odata::parse_unit)
    }

    pub fn create_personal_site_enqueue_bulk<S: AsRef<str>>(
        &self,
        emails: &[S],
    ) -> Result<Call<()>, ApiError> {
        self.profile_loader()?.create_personal_site_enqueue_bulk(emails)
    }

    pub fn owner_user_profile(&self) -> Result<Call<UserProfile>, ApiError> {
        self.profile_loader()?.owner_user_profile()
    }

    pub fn user_profile(&self) -> Result<Call<UserProfile>, ApiError> {
        self.profile_loader()?.user_profile()
    }

    pub fn create_personal_site(&self, interactive_request: bool) -> Result<Call<()>, ApiError> {
        self.profile_loader()?.create_personal_site(interactive_request)
    }

    pub fn share_all_social_data(&self, share: bool) -> Result<Call<()>, ApiError> {
        self.profile_loader()?.share_all_social_data(share)
    }

    pub fn client_people_picker_resolve_user(
        &self,
        query_params: &ClientPeoplePickerQueryParameters,
    ) -> Result<Call<PeoplePickerEntity>, ApiError> {
        self.people_picker()?.client_people_picker_resolve_user(query_params)
    }

    pub fn client_people_picker_search_user(
        &self,
        query_params: &ClientPeoplePickerQueryParameters,
    ) -> Result<Call<Vec<PeoplePickerEntity>>, ApiError> {
        self.people_picker()?.client_people_picker_search_user(query_params)
    }
}
