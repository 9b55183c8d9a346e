//! In-memory stand-in for the user-profile REST API.
//!
//! Answers the people manager, profile loader and people picker endpoints
//! in verbose OData (`{"d": ...}`) against a small seeded directory. Every
//! route lives under `/_api/{*rest}` because the service's paths use
//! function-call syntax (`amifollowedby(@v)`, `.gettrendingtags`) rather than
//! plain segments, so dispatch happens on the decoded path string.
//! `$batch` requests are decoded part by part and fed through the same
//! dispatcher.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::RwLock};

mod batch;

pub const PEOPLE_PICKER_TYPE: &str = "SP.UI.ApplicationPages.ClientPeoplePickerQueryParameters";

pub const ALICE: &str = "i:0#.f|membership|alice@contoso.com";
pub const BOB: &str = "i:0#.f|membership|bob@contoso.com";
pub const CAROL: &str = "i:0#.f|membership|carol@contoso.com";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Person {
    pub account_name: String,
    pub display_name: String,
    pub email: String,
    pub properties: BTreeMap<String, String>,
    pub multi_properties: BTreeMap<String, Vec<String>>,
}

impl Person {
    fn new(account_name: &str, display_name: &str, email: &str, title: &str) -> Self {
        let mut properties = BTreeMap::new();
        properties.insert("Title".to_string(), title.to_string());
        Self {
            account_name: account_name.to_string(),
            display_name: display_name.to_string(),
            email: email.to_string(),
            properties,
            multi_properties: BTreeMap::new(),
        }
    }

    fn properties_json(&self, directory: &Directory) -> Value {
        let props: Vec<Value> = self
            .properties
            .iter()
            .map(|(k, v)| json!({"Key": k, "Value": v, "ValueType": "Edm.String"}))
            .chain(self.multi_properties.iter().map(|(k, v)| {
                json!({"Key": k, "Value": v.join("|"), "ValueType": "Edm.String"})
            }))
            .collect();
        json!({
            "__metadata": {"type": "SP.UserProfiles.PersonProperties"},
            "AccountName": self.account_name,
            "DisplayName": self.display_name,
            "Email": self.email,
            "Title": self.properties.get("Title").cloned().unwrap_or_default(),
            "IsFollowed": directory.follows.contains(&(directory.current_user.clone(), self.account_name.clone())),
            "UserProfileProperties": {"results": props},
        })
    }

    fn user_profile_json(&self, directory: &Directory) -> Value {
        let (site, state) = if directory.personal_sites.contains(&self.email) {
            let url = format!("https://contoso-my/personal/{}", self.display_name.to_lowercase());
            (Value::String(url), 2)
        } else {
            (Value::Null, 0)
        };
        json!({
            "__metadata": {"type": "SP.UserProfiles.UserProfile"},
            "AccountName": self.account_name,
            "DisplayName": self.display_name,
            "FollowedContent": {"__deferred": {"uri": "https://contoso/_api/followedcontent"}},
            "PersonalSite": site,
            "PersonalSiteInstantiationState": state,
            "PictureImportEnabled": false,
            "PublicUrl": format!("https://contoso-my/person.aspx?accountname={}", self.email),
        })
    }

    fn picker_entity(&self, resolved: bool) -> Value {
        json!({
            "Key": self.account_name,
            "DisplayText": self.display_name,
            "IsResolved": resolved,
            "Description": self.email,
            "EntityType": "User",
            "EntityData": {
                "AccountName": self.account_name,
                "Email": self.email,
                "Title": self.properties.get("Title").cloned().unwrap_or_default(),
            },
            "MultipleMatches": [],
            "ProviderName": "Tenant",
            "ProviderDisplayName": "Tenant",
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Directory {
    pub current_user: String,
    pub site_owner: String,
    pub people: Vec<Person>,
    /// `(follower, followee)` pairs.
    pub follows: BTreeSet<(String, String)>,
    pub followed_tags: Vec<String>,
    pub trending_tags: Vec<(String, u64)>,
    pub hidden_suggestions: BTreeSet<String>,
    pub people_list_public: bool,
    pub share_all_social_data: bool,
    /// Emails with a personal site created or queued.
    pub personal_sites: BTreeSet<String>,
    pub profile_picture: Option<Vec<u8>>,
}

impl Directory {
    pub fn seeded() -> Self {
        let people = vec![
            Person::new(ALICE, "Alice", "alice@contoso.com", "Engineer"),
            Person::new(BOB, "Bob", "bob@contoso.com", "Designer"),
            Person::new(CAROL, "Carol", "carol@contoso.com", "Manager"),
        ];
        let follows = [(ALICE, BOB), (CAROL, ALICE)]
            .into_iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect();
        Self {
            current_user: ALICE.to_string(),
            site_owner: CAROL.to_string(),
            people,
            follows,
            followed_tags: vec!["#rust".to_string(), "#http".to_string()],
            trending_tags: vec![("#rust".to_string(), 42), ("#release".to_string(), 7)],
            hidden_suggestions: BTreeSet::new(),
            people_list_public: true,
            share_all_social_data: false,
            personal_sites: BTreeSet::new(),
            profile_picture: None,
        }
    }

    fn person(&self, login: &str) -> Option<&Person> {
        self.people
            .iter()
            .find(|p| p.account_name.eq_ignore_ascii_case(login) || p.email.eq_ignore_ascii_case(login))
    }

    fn person_mut(&mut self, login: &str) -> Option<&mut Person> {
        self.people
            .iter_mut()
            .find(|p| p.account_name.eq_ignore_ascii_case(login) || p.email.eq_ignore_ascii_case(login))
    }

    fn current(&self) -> Option<&Person> {
        self.person(&self.current_user)
    }

    fn followers_of(&self, account: &str) -> Vec<Value> {
        self.follows
            .iter()
            .filter(|(_, followee)| followee == account)
            .filter_map(|(follower, _)| self.person(follower))
            .map(|p| p.properties_json(self))
            .collect()
    }

    fn followed_by(&self, account: &str) -> Vec<Value> {
        self.follows
            .iter()
            .filter(|(follower, _)| follower == account)
            .filter_map(|(_, followee)| self.person(followee))
            .map(|p| p.properties_json(self))
            .collect()
    }

    fn search(&self, query: &str) -> Vec<&Person> {
        let query = query.to_lowercase();
        self.people
            .iter()
            .filter(|p| {
                p.display_name.to_lowercase().contains(&query)
                    || p.email.to_lowercase().contains(&query)
                    || p.account_name.to_lowercase() == query
            })
            .collect()
    }
}

pub type Db = Arc<RwLock<Directory>>;

pub fn app() -> Router {
    app_with_state(Arc::new(RwLock::new(Directory::seeded())))
}

/// Router over a caller-held directory, so tests can inspect side effects.
pub fn app_with_state(db: Db) -> Router {
    Router::new()
        .route("/_api/{*rest}", any(api))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

pub async fn run_with_state(listener: TcpListener, db: Db) -> Result<(), std::io::Error> {
    axum::serve(listener, app_with_state(db)).await
}

type ApiResult = Result<Response, StatusCode>;

async fn api(
    State(db): State<Db>,
    method: Method,
    Path(rest): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let rest = rest.trim_matches('/');
    tracing::info!(%method, path = %rest, "mock request");
    if rest.eq_ignore_ascii_case("$batch") {
        return batch::handle(&db, &method, &headers, &body)
            .await
            .unwrap_or_else(|status| status.into_response());
    }
    route(&db, &method, rest, &params, &body).await
}

/// Dispatch one decoded request; `$batch` parts come through here too.
pub(crate) async fn route(
    db: &Db,
    method: &Method,
    rest: &str,
    params: &HashMap<String, String>,
    body: &Bytes,
) -> Response {
    let result = if let Some(op) = rest.strip_prefix("sp.userprofiles.peoplemanager") {
        people_manager(db, method, op, params, body).await
    } else if let Some(op) = rest.strip_prefix("sp.userprofiles.profileloader.") {
        profile_loader(db, method, op, body).await
    } else if let Some(op) =
        rest.strip_prefix("sp.ui.applicationpages.clientpeoplepickerwebserviceinterface.")
    {
        people_picker(db, method, op, body).await
    } else {
        Err(StatusCode::NOT_FOUND)
    };
    result.unwrap_or_else(|status| status.into_response())
}

fn verbose(value: Value) -> ApiResult {
    Ok(Json(json!({ "d": value })).into_response())
}

fn results(items: Vec<Value>) -> ApiResult {
    verbose(json!({ "results": items }))
}

fn no_content() -> ApiResult {
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// Value bound to a parameter alias, with its single quotes removed.
fn alias<'a>(params: &'a HashMap<String, String>, name: &str) -> Result<&'a str, StatusCode> {
    let raw = params.get(name).ok_or(StatusCode::BAD_REQUEST)?;
    raw.strip_prefix('\'')
        .and_then(|v| v.strip_suffix('\''))
        .ok_or(StatusCode::BAD_REQUEST)
}

fn require(method: &Method, expected: Method) -> Result<(), StatusCode> {
    if *method == expected {
        Ok(())
    } else {
        Err(StatusCode::METHOD_NOT_ALLOWED)
    }
}

fn json_body<T: serde::de::DeserializeOwned>(body: &Bytes) -> Result<T, StatusCode> {
    serde_json::from_slice(body).map_err(|_| StatusCode::BAD_REQUEST)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SingleValue {
    account_name: String,
    property_name: String,
    property_value: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct MultiValue {
    account_name: String,
    property_name: String,
    property_values: Vec<String>,
}

async fn people_manager(
    db: &Db,
    method: &Method,
    op: &str,
    params: &HashMap<String, String>,
    body: &Bytes,
) -> ApiResult {
    if let Some(dot) = op.strip_prefix('.') {
        return people_manager_static(db, method, dot, params).await;
    }
    let op = op.trim_start_matches('/');

    match op {
        "EditProfileLink" => {
            require(method, Method::GET)?;
            verbose(json!({"EditProfileLink": "https://contoso-my/_layouts/15/editprofile.aspx"}))
        }
        "IsMyPeopleListPublic" => {
            require(method, Method::GET)?;
            let dir = db.read().await;
            verbose(json!({"IsMyPeopleListPublic": dir.people_list_public}))
        }
        "amifollowedby(@v)" => {
            require(method, Method::GET)?;
            let login = alias(params, "@v")?;
            let dir = db.read().await;
            let other = dir.person(login).ok_or(StatusCode::NOT_FOUND)?;
            let followed = dir
                .follows
                .contains(&(other.account_name.clone(), dir.current_user.clone()));
            verbose(json!({"AmIFollowedBy": followed}))
        }
        "amifollowing(@v)" => {
            require(method, Method::GET)?;
            let login = alias(params, "@v")?;
            let dir = db.read().await;
            let other = dir.person(login).ok_or(StatusCode::NOT_FOUND)?;
            let following = dir
                .follows
                .contains(&(dir.current_user.clone(), other.account_name.clone()));
            verbose(json!({"AmIFollowing": following}))
        }
        "getfollowersfor(@v)" => {
            require(method, Method::GET)?;
            let login = alias(params, "@v")?;
            let dir = db.read().await;
            let person = dir.person(login).ok_or(StatusCode::NOT_FOUND)?;
            results(dir.followers_of(&person.account_name))
        }
        "getpeoplefollowedby(@v)" => {
            require(method, Method::GET)?;
            let login = alias(params, "@v")?;
            let dir = db.read().await;
            let person = dir.person(login).ok_or(StatusCode::NOT_FOUND)?;
            results(dir.followed_by(&person.account_name))
        }
        "getmyfollowers" => {
            require(method, Method::GET)?;
            let dir = db.read().await;
            results(dir.followers_of(&dir.current_user))
        }
        "getmyproperties" => {
            require(method, Method::GET)?;
            let dir = db.read().await;
            let me = dir.current().ok_or(StatusCode::NOT_FOUND)?;
            verbose(me.properties_json(&dir))
        }
        "getpropertiesfor(@v)" => {
            require(method, Method::GET)?;
            let login = alias(params, "@v")?;
            let dir = db.read().await;
            let person = dir.person(login).ok_or(StatusCode::NOT_FOUND)?;
            verbose(person.properties_json(&dir))
        }
        "hidesuggestion(@v)" => {
            require(method, Method::POST)?;
            let login = alias(params, "@v")?.to_string();
            db.write().await.hidden_suggestions.insert(login);
            no_content()
        }
        "setmyprofilepicture" => {
            require(method, Method::POST)?;
            if body.is_empty() {
                return Err(StatusCode::BAD_REQUEST);
            }
            db.write().await.profile_picture = Some(body.to_vec());
            no_content()
        }
        "SetSingleValueProfileProperty" => {
            require(method, Method::POST)?;
            let input: SingleValue = json_body(body)?;
            let mut dir = db.write().await;
            let person = dir.person_mut(&input.account_name).ok_or(StatusCode::NOT_FOUND)?;
            person.properties.insert(input.property_name, input.property_value);
            no_content()
        }
        "SetMultiValuedProfileProperty" => {
            require(method, Method::POST)?;
            let input: MultiValue = json_body(body)?;
            let mut dir = db.write().await;
            let person = dir.person_mut(&input.account_name).ok_or(StatusCode::NOT_FOUND)?;
            person.multi_properties.insert(input.property_name, input.property_values);
            no_content()
        }
        other => people_manager_call(db, method, other, params).await,
    }
}

/// Operations whose arguments are inlined into the path.
async fn people_manager_call(
    db: &Db,
    method: &Method,
    op: &str,
    params: &HashMap<String, String>,
) -> ApiResult {
    if let Some(count) = op
        .strip_prefix("getfollowedtags(")
        .and_then(|rest| rest.strip_suffix(')'))
    {
        require(method, Method::GET)?;
        let count: usize = count.parse().map_err(|_| StatusCode::BAD_REQUEST)?;
        let dir = db.read().await;
        let tags = dir
            .followed_tags
            .iter()
            .take(count)
            .map(|t| Value::String(t.clone()))
            .collect();
        return results(tags);
    }

    if let Some(property) = op
        .strip_prefix("getuserprofilepropertyfor(accountname=@v, propertyname='")
        .and_then(|rest| rest.strip_suffix("')"))
    {
        require(method, Method::GET)?;
        let login = alias(params, "@v")?;
        let dir = db.read().await;
        let person = dir.person(login).ok_or(StatusCode::NOT_FOUND)?;
        let value = match property {
            "AccountName" => person.account_name.clone(),
            "PreferredName" => person.display_name.clone(),
            "WorkEmail" => person.email.clone(),
            other => person
                .properties
                .get(other)
                .cloned()
                .or_else(|| person.multi_properties.get(other).map(|v| v.join("|")))
                .unwrap_or_default(),
        };
        return verbose(json!({"GetUserProfilePropertyFor": value}));
    }

    Err(StatusCode::NOT_FOUND)
}

async fn people_manager_static(
    db: &Db,
    method: &Method,
    op: &str,
    params: &HashMap<String, String>,
) -> ApiResult {
    match op {
        "gettrendingtags" => {
            require(method, Method::GET)?;
            let dir = db.read().await;
            let items: Vec<Value> = dir
                .trending_tags
                .iter()
                .map(|(name, count)| json!({"Name": name, "UseCount": count}))
                .collect();
            verbose(json!({
                "__metadata": {"type": "SP.UserProfiles.HashTagCollection"},
                "Items": {"results": items},
            }))
        }
        "isfollowing(possiblefolloweraccountname=@v,possiblefolloweeaccountname=@y)" => {
            require(method, Method::GET)?;
            let follower = alias(params, "@v")?;
            let followee = alias(params, "@y")?;
            let dir = db.read().await;
            let a = dir.person(follower).ok_or(StatusCode::NOT_FOUND)?;
            let b = dir.person(followee).ok_or(StatusCode::NOT_FOUND)?;
            let following = dir
                .follows
                .contains(&(a.account_name.clone(), b.account_name.clone()));
            verbose(json!({"IsFollowing": following}))
        }
        _ => Err(StatusCode::NOT_FOUND),
    }
}

#[derive(Deserialize)]
struct EnqueueBulk {
    #[serde(rename = "emailIDs")]
    email_ids: Vec<String>,
}

async fn profile_loader(db: &Db, method: &Method, op: &str, body: &Bytes) -> ApiResult {
    require(method, Method::POST)?;

    if op == "getowneruserprofile" {
        let dir = db.read().await;
        let owner = dir.person(&dir.site_owner).ok_or(StatusCode::NOT_FOUND)?;
        return verbose(owner.user_profile_json(&dir));
    }

    let op = op.strip_prefix("getprofileloader/").ok_or(StatusCode::NOT_FOUND)?;
    match op {
        "getuserprofile" => {
            let dir = db.read().await;
            let me = dir.current().ok_or(StatusCode::NOT_FOUND)?;
            verbose(me.user_profile_json(&dir))
        }
        "createpersonalsiteenqueuebulk" => {
            let input: EnqueueBulk = json_body(body)?;
            if input.email_ids.len() > 200 {
                return Err(StatusCode::BAD_REQUEST);
            }
            db.write().await.personal_sites.extend(input.email_ids);
            no_content()
        }
        "getuserprofile/createpersonalsiteenque(true)"
        | "getuserprofile/createpersonalsiteenque(false)" => {
            let mut dir = db.write().await;
            let email = dir.current().map(|p| p.email.clone()).ok_or(StatusCode::NOT_FOUND)?;
            dir.personal_sites.insert(email);
            no_content()
        }
        "getuserprofile/shareallsocialdata(true)" => {
            db.write().await.share_all_social_data = true;
            no_content()
        }
        "getuserprofile/shareallsocialdata(false)" => {
            db.write().await.share_all_social_data = false;
            no_content()
        }
        _ => Err(StatusCode::NOT_FOUND),
    }
}

#[derive(Deserialize)]
struct PickerRequest {
    #[serde(rename = "queryParams")]
    query_params: PickerParams,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PickerParams {
    #[serde(rename = "__metadata")]
    metadata: Metadata,
    query_string: String,
    maximum_entity_suggestions: usize,
}

#[derive(Deserialize)]
struct Metadata {
    #[serde(rename = "type")]
    type_name: String,
}

async fn people_picker(db: &Db, method: &Method, op: &str, body: &Bytes) -> ApiResult {
    require(method, Method::POST)?;
    let input: PickerRequest = json_body(body)?;
    let params = input.query_params;
    if params.metadata.type_name != PEOPLE_PICKER_TYPE {
        return Err(StatusCode::BAD_REQUEST);
    }
    let dir = db.read().await;
    let matches = dir.search(&params.query_string);

    match op {
        "clientpeoplepickerresolveuser" => {
            let entity = match matches.as_slice() {
                [] => return Err(StatusCode::NOT_FOUND),
                [only] => only.picker_entity(true),
                many => {
                    let candidates: Vec<Value> = many.iter().map(|p| p.picker_entity(false)).collect();
                    json!({
                        "Key": params.query_string,
                        "DisplayText": params.query_string,
                        "IsResolved": false,
                        "Description": "Multiple entities matched.",
                        "EntityType": "",
                        "MultipleMatches": candidates,
                    })
                }
            };
            verbose(json!({"ClientPeoplePickerResolveUser": entity.to_string()}))
        }
        "clientpeoplepickersearchuser" => {
            let entities: Vec<Value> = matches
                .iter()
                .take(params.maximum_entity_suggestions)
                .map(|p| p.picker_entity(false))
                .collect();
            verbose(json!({"ClientPeoplePickerSearchUser": Value::Array(entities).to_string()}))
        }
        _ => Err(StatusCode::NOT_FOUND),
    }
}
