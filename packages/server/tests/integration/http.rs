use std::io::Cursor;
use std::time::Duration;

use serde_json::json;
use uuid::Uuid;

use crate::common::{MAX_FILE_SIZE, TestApp, routes};

mod authentication {
    use super::*;

    #[tokio::test]
    async fn upload_requires_token() {
        let app = TestApp::spawn().await;
        let res = app
            .upload_with_token("t", &[("a.png", "image/png", vec![1])], None)
            .await;
        assert_eq!(res.status, 401);
        assert_eq!(res.body["code"], "TOKEN_MISSING");
    }

    #[tokio::test]
    async fn forged_token_is_rejected() {
        let app = TestApp::spawn().await;
        let forged = submission_server::utils::jwt::sign("wrong-secret", "admin", true).unwrap();
        let res = app.get_with_token(routes::SUBMISSIONS, &forged).await;
        assert_eq!(res.status, 401);
        assert_eq!(res.body["code"], "TOKEN_INVALID");
    }

    #[tokio::test]
    async fn non_admin_cannot_review() {
        let app = TestApp::spawn().await;
        let id = app.create_submission("user-1", "t").await;
        let token = app.user_token("user-1");

        for path in [
            routes::SUBMISSIONS.to_string(),
            routes::submission(id),
            routes::archive(id),
        ] {
            let res = app.get_with_token(&path, &token).await;
            assert_eq!(res.status, 403, "{path}");
            assert_eq!(res.body["code"], "PERMISSION_DENIED");
        }

        let res = app
            .delete_json_with_token(routes::SUBMISSIONS, &json!({ "ids": [id] }), &token)
            .await;
        assert_eq!(res.status, 403);
    }
}

mod submissions {
    use super::*;

    #[tokio::test]
    async fn created_submission_is_listed_newest_first() {
        let app = TestApp::spawn().await;
        let older = app.create_submission("user-1", "First").await;
        let newer = app.create_submission("user-2", "Second").await;

        let res = app
            .get_with_token(routes::SUBMISSIONS, &app.admin_token())
            .await;
        assert_eq!(res.status, 200);
        assert_eq!(res.body["total"], 2);
        assert_eq!(res.body["submissions"][0]["id"], newer.to_string());
        assert_eq!(res.body["submissions"][1]["id"], older.to_string());

        let files = &res.body["submissions"][1]["files"];
        assert_eq!(files[0]["type"], "image");
        assert_eq!(files[1]["type"], "video");
        assert_eq!(files[1]["size"], 32);
    }

    #[tokio::test]
    async fn list_filters_by_uid() {
        let app = TestApp::spawn().await;
        app.create_submission("user-1", "a").await;
        app.create_submission("user-2", "b").await;

        let res = app
            .get_with_token(
                &format!("{}?uid=user-2", routes::SUBMISSIONS),
                &app.admin_token(),
            )
            .await;
        assert_eq!(res.body["total"], 1);
        assert_eq!(res.body["submissions"][0]["uid"], "user-2");
    }

    #[tokio::test]
    async fn tags_are_stored_as_sent() {
        let app = TestApp::spawn().await;
        let res = app
            .upload_with_token(
                "  Summer  Trip ",
                &[("a.png", "image/png", vec![1])],
                Some(&app.user_token("u")),
            )
            .await;
        assert_eq!(res.status, 201);

        let res = app
            .get_with_token(&routes::submission(res.uuid()), &app.admin_token())
            .await;
        assert_eq!(res.body["tags"], "  Summer  Trip ");
    }

    #[tokio::test]
    async fn long_filename_is_accepted() {
        let app = TestApp::spawn().await;
        let name = format!("{}.png", "a".repeat(500));
        let res = app
            .upload_with_token(
                "t",
                &[(name.as_str(), "image/png", vec![1, 2, 3, 4])],
                Some(&app.user_token("u1")),
            )
            .await;
        assert_eq!(res.status, 201, "{}", res.text);
    }

    #[tokio::test]
    async fn rejects_non_media_upload() {
        let app = TestApp::spawn().await;
        let res = app
            .upload_with_token(
                "t",
                &[("doc.pdf", "application/pdf", vec![1, 2, 3])],
                Some(&app.user_token("u")),
            )
            .await;
        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
        assert!(app.pipeline.metadata.is_empty().await);
    }

    #[tokio::test]
    async fn rejects_oversized_file() {
        let app = TestApp::spawn().await;
        let res = app
            .upload_with_token(
                "t",
                &[("big.png", "image/png", vec![0; MAX_FILE_SIZE as usize])],
                Some(&app.user_token("u")),
            )
            .await;
        assert_eq!(res.status, 400);
        assert!(app.pipeline.blobs.inner.is_empty());
    }

    #[tokio::test]
    async fn storage_failure_is_reported() {
        let app = TestApp::spawn().await;
        app.pipeline.blobs.fail_puts_containing("bad");
        let res = app
            .upload_with_token(
                "t",
                &[
                    ("good.png", "image/png", vec![1]),
                    ("bad.png", "image/png", vec![1]),
                ],
                Some(&app.user_token("u")),
            )
            .await;
        assert_eq!(res.status, 502);
        assert_eq!(res.body["code"], "UPLOAD_FAILED");
        assert!(app.pipeline.metadata.is_empty().await);
    }

    #[tokio::test]
    async fn unknown_submission_is_not_found() {
        let app = TestApp::spawn().await;
        let res = app
            .get_with_token(&routes::submission(Uuid::now_v7()), &app.admin_token())
            .await;
        assert_eq!(res.status, 404);
        assert_eq!(res.body["code"], "NOT_FOUND");
    }
}

mod deletion {
    use super::*;

    #[tokio::test]
    async fn deleted_submission_disappears() {
        let app = TestApp::spawn().await;
        let id = app.create_submission("user-1", "t").await;
        let admin = app.admin_token();

        let res = app
            .delete_json_with_token(routes::SUBMISSIONS, &json!({ "ids": [id] }), &admin)
            .await;
        assert_eq!(res.status, 204);

        let res = app.get_with_token(&routes::submission(id), &admin).await;
        assert_eq!(res.status, 404);
        let res = app.get_with_token(routes::SUBMISSIONS, &admin).await;
        assert_eq!(res.body["total"], 0);
    }

    #[tokio::test]
    async fn unknown_id_changes_nothing() {
        let app = TestApp::spawn().await;
        let id = app.create_submission("user-1", "t").await;
        let admin = app.admin_token();

        let res = app
            .delete_json_with_token(
                routes::SUBMISSIONS,
                &json!({ "ids": [id, Uuid::now_v7()] }),
                &admin,
            )
            .await;
        assert_eq!(res.status, 404);

        let res = app.get_with_token(&routes::submission(id), &admin).await;
        assert_eq!(res.status, 200);
    }

    #[tokio::test]
    async fn malformed_ids_are_rejected() {
        let app = TestApp::spawn().await;
        let res = app
            .delete_json_with_token(
                routes::SUBMISSIONS,
                &json!({ "ids": ["not-a-uuid"] }),
                &app.admin_token(),
            )
            .await;
        assert_eq!(res.status, 400);
        assert_eq!(res.body["code"], "VALIDATION_ERROR");
    }
}

mod archive_download {
    use super::*;

    #[tokio::test]
    async fn downloads_zip_attachment() {
        let app = TestApp::spawn().await;
        let id = app.create_submission("user-1", "Foo Bar").await;

        let (status, headers, bytes) = app
            .get_bytes_with_token(&routes::archive(id), &app.admin_token())
            .await;
        assert_eq!(status, 200);
        assert_eq!(headers["content-type"], "application/zip");
        let disposition = headers["content-disposition"].to_str().unwrap();
        assert!(disposition.starts_with("attachment;"));
        assert!(disposition.contains("foo-bar.zip"));

        let mut zip = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut names: Vec<String> = zip.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(names, vec!["foo-bar-1.png", "foo-bar-2.mp4"]);
        assert!(zip.by_name("foo-bar-1.png").is_ok());
    }
}

mod live_stream {
    use super::*;

    async fn next_snapshot(res: &mut reqwest::Response, buffer: &mut String) -> serde_json::Value {
        loop {
            if let Some(start) = buffer.find("event: snapshot\n") {
                let rest = &buffer[start..];
                if let Some(end) = rest.find("\n\n") {
                    let frame = rest[..end].to_string();
                    buffer.replace_range(..start + end + 2, "");
                    let data = frame
                        .lines()
                        .find_map(|l| l.strip_prefix("data: "))
                        .expect("snapshot frame has data");
                    return serde_json::from_str(data).unwrap();
                }
            }
            let chunk = tokio::time::timeout(Duration::from_secs(5), res.chunk())
                .await
                .expect("timed out waiting for snapshot")
                .unwrap()
                .expect("stream ended");
            buffer.push_str(&String::from_utf8_lossy(&chunk));
        }
    }

    #[tokio::test]
    async fn streams_initial_and_updated_snapshots() {
        let app = TestApp::spawn().await;
        let first = app.create_submission("user-1", "one").await;

        let mut res = app
            .client
            .get(app.url(routes::SUBMISSIONS_LIVE))
            .header("Authorization", format!("Bearer {}", app.admin_token()))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
        let mut buffer = String::new();

        let initial = next_snapshot(&mut res, &mut buffer).await;
        assert_eq!(initial["total"], 1);
        assert_eq!(initial["submissions"][0]["id"], first.to_string());

        let second = app.create_submission("user-2", "two").await;
        let updated = next_snapshot(&mut res, &mut buffer).await;
        assert_eq!(updated["total"], 2);
        assert_eq!(updated["submissions"][0]["id"], second.to_string());

        app.pipeline.deletes().soft_delete(&[first]).await.unwrap();
        let after_delete = next_snapshot(&mut res, &mut buffer).await;
        assert_eq!(after_delete["total"], 1);
        assert_eq!(after_delete["submissions"][0]["id"], second.to_string());
    }
}
