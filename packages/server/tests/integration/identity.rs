use serde_json::json;

use crate::common::{ADMIN_EMAIL, TestApp, routes};

#[tokio::test]
async fn allow_listed_email_gets_admin_claim() {
    let app = TestApp::spawn().await;
    let res = app
        .post_without_token(routes::BEFORE_CREATE, &json!({ "email": ADMIN_EMAIL }))
        .await;

    assert_eq!(res.status, 200);
    assert_eq!(res.body["custom_claims"]["admin"], true);
}

#[tokio::test]
async fn other_emails_get_no_claims() {
    let app = TestApp::spawn().await;
    for body in [json!({ "email": "someone@example.com" }), json!({})] {
        let res = app.post_without_token(routes::BEFORE_CREATE, &body).await;
        assert_eq!(res.status, 200);
        assert!(res.body.get("custom_claims").is_none(), "{}", res.text);
    }
}

#[tokio::test]
async fn malformed_body_is_a_validation_error() {
    let app = TestApp::spawn().await;
    let res = app
        .post_without_token(routes::BEFORE_CREATE, &json!({ "email": 42 }))
        .await;
    assert_eq!(res.status, 400);
    assert_eq!(res.body["code"], "VALIDATION_ERROR");
}
