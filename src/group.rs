use diesel::dsl::exists;
use diesel::prelude::*;
use diesel::{delete, insert_into, select};
use rocket::get;
use rocket::serde::json::Json;
use tracing::info;

use crate::db::schema::groups;
use crate::db::DbConnection;
use crate::feed::{self, Page, Scope};
use crate::post::PostView;
use crate::types::ApiResult;

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Identifiable, Serialize)]
#[diesel(table_name = groups)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct Group {
    pub id: i32,
    pub title: String,
    pub slug: String,
    pub description: String,
}

impl Group {
    pub fn load_by_slug(slug_: &str, connection: &mut SqliteConnection) -> QueryResult<Group> {
        use crate::db::schema::groups::dsl::*;
        groups
            .filter(slug.eq(slug_))
            .select(Group::as_select())
            .get_result(connection)
    }

    pub fn all(connection: &mut SqliteConnection) -> QueryResult<Vec<Group>> {
        groups::table
            .order(groups::title.asc())
            .select(Group::as_select())
            .load(connection)
    }

    pub fn exists(group_id: i32, connection: &mut SqliteConnection) -> QueryResult<bool> {
        select(exists(groups::table.find(group_id))).get_result(connection)
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = groups)]
pub struct NewGroup {
    pub title: String,
    pub slug: String,
    pub description: String,
}

impl NewGroup {
    /// The slug is derived from the title unless one is given.
    pub fn new(title: &str, slug: Option<&str>, description: &str) -> NewGroup {
        NewGroup {
            title: title.to_string(),
            slug: slug
                .map(str::to_string)
                .unwrap_or_else(|| slug::slugify(title)),
            description: description.to_string(),
        }
    }
}

pub fn create_group(connection: &mut SqliteConnection, new_group: &NewGroup) -> QueryResult<Group> {
    let group = insert_into(groups::table)
        .values(new_group)
        .returning(Group::as_returning())
        .get_result(connection)?;
    info!(group_id = group.id, slug = %group.slug, "group created");
    Ok(group)
}

/// Posts of the group stay, with no group.
pub fn delete_group(connection: &mut SqliteConnection, group_id: i32) -> QueryResult<bool> {
    let removed = delete(groups::table.find(group_id)).execute(connection)?;
    Ok(removed > 0)
}

#[derive(Debug, Serialize)]
pub struct GroupPage {
    group: Group,
    page: Page<PostView>,
}

#[get("/group/<slug>?<page>")]
pub fn group_posts(
    mut connection: DbConnection,
    slug: &str,
    page: Option<&str>,
) -> ApiResult<GroupPage> {
    let group = Group::load_by_slug(slug, &mut connection)?;
    let page = feed::paginate(&mut connection, Scope::Group(group.id), page)?;
    Ok(Json(GroupPage { group, page }))
}
