use rocket::get;
use rocket::serde::json::Json;

#[derive(Debug, Serialize)]
pub struct StaticPage {
    template: &'static str,
    title: &'static str,
}

#[get("/author")]
pub fn author() -> Json<StaticPage> {
    Json(StaticPage {
        template: "about/author",
        title: "About the author",
    })
}

#[get("/tech")]
pub fn tech() -> Json<StaticPage> {
    Json(StaticPage {
        template: "about/tech",
        title: "Technologies",
    })
}

#[cfg(test)]
mod tests {
    use crate::test_utils::TestApp;
    use rocket::http::Status;
    use serde_json::Value;

    #[test]
    fn static_pages_are_public() {
        let app = TestApp::new();
        for (path, template) in [("/about/author/", "about/author"), ("/about/tech/", "about/tech")] {
            let response = app.client.get(path).dispatch();
            assert_eq!(response.status(), Status::Ok);
            let body: Value = response.into_json().unwrap();
            assert_eq!(body["template"], template);
        }
    }
}
