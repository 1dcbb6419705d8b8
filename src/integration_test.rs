#[cfg(test)]
mod tests {
    use anyhow::Result;
    use bytes::Bytes;
    use chrono::Utc;
    use futures::{stream, StreamExt};

    use crate::{
        http_objects::{FileRecord, LinkClass, Visibility},
        testing::TestService,
    };

    async fn upload(test_srv: &TestService, key: &str, data: &'static str) -> FileRecord {
        let body = Box::pin(stream::once(async move { Ok(Bytes::from(data)) }));
        let put_result = test_srv.service.blob_storage.put(key, body).await.unwrap();
        let record = FileRecord {
            key: key.to_string(),
            original_name: format!("{key}.bin"),
            content_type: "application/octet-stream".to_string(),
            size_bytes: put_result.size_bytes,
            sha256_hash: put_result.sha256_hash,
            visibility: Visibility::Private,
            uploaded_at: Utc::now(),
        };
        test_srv.service.catalog.insert(record.clone()).await;
        record
    }

    fn secure_triple(test_srv: &TestService, url: &str) -> (String, String, String) {
        let base = &test_srv.service.config.public_base_url;
        let path = url
            .strip_prefix(base.as_str())
            .unwrap_or(url)
            .trim_start_matches("/secure/");
        let parts: Vec<&str> = path.split('/').collect();
        assert_eq!(parts.len(), 3, "unexpected secure url: {url}");
        (
            parts[0].to_string(),
            parts[1].to_string(),
            parts[2].to_string(),
        )
    }

    #[tokio::test]
    async fn test_upload_link_resolve_stream() -> Result<()> {
        let test_srv = TestService::new().await?;
        let record = upload(&test_srv, "report", "quarterly numbers").await;

        let link = test_srv
            .service
            .issuer
            .link_for(&record, LinkClass::Standard, None, None)
            .await?;
        let (id, ts, hash) = secure_triple(&test_srv, &link.url);

        let resolved = test_srv.service.registry.resolve(&id, &ts, &hash).await?;
        assert_eq!(resolved.object_key, "report");

        let mut body = test_srv
            .service
            .blob_storage
            .get(&resolved.object_key)
            .await?;
        let mut bytes = Vec::new();
        while let Some(chunk) = body.next().await {
            bytes.extend_from_slice(&chunk?);
        }
        assert_eq!(&bytes[..], b"quarterly numbers");

        let stats = test_srv.service.registry.stats(&id).await.unwrap();
        assert_eq!(stats.access_count, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_temporary_link_single_use_end_to_end() -> Result<()> {
        let test_srv = TestService::new().await?;
        let record = upload(&test_srv, "secret", "one time only").await;

        let link = test_srv
            .service
            .issuer
            .link_for(&record, LinkClass::Temporary, None, None)
            .await?;
        let (id, ts, hash) = secure_triple(&test_srv, &link.url);

        assert!(test_srv.service.registry.resolve(&id, &ts, &hash).await.is_ok());
        assert!(test_srv
            .service
            .registry
            .resolve(&id, &ts, &hash)
            .await
            .is_err());
        // exhausted mapping was dropped on the failed resolve
        assert!(test_srv.service.registry.stats(&id).await.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_deleting_file_breaks_future_issuance() -> Result<()> {
        let test_srv = TestService::new().await?;
        let record = upload(&test_srv, "gone-soon", "data").await;

        test_srv.service.catalog.remove(&record.key).await;
        test_srv.service.blob_storage.delete(&record.key).await?;

        let err = test_srv
            .service
            .issuer
            .link_for(&record, LinkClass::Standard, None, None)
            .await
            .unwrap_err();
        assert_eq!(err.object_key, "gone-soon");
        Ok(())
    }
}
