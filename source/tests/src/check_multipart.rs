#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use futures_util::stream;
    use serde_json::json;

    use strada::error::ParseError;
    use strada::multipart::{parse_multipart, TextField};
    use strada_config::{MultipartConfig, UploadStrategy};

    const CT: &str = "multipart/form-data; boundary=----strada-test";

    fn body() -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"------strada-test\r\n");
        out.extend_from_slice(b"Content-Disposition: form-data; name=\"userId\"\r\n\r\n");
        out.extend_from_slice(b"123\r\n");
        out.extend_from_slice(b"------strada-test\r\n");
        out.extend_from_slice(
            b"Content-Disposition: form-data; name=\"avatar\"; filename=\"profile.jpg\"\r\n",
        );
        out.extend_from_slice(b"Content-Type: image/jpeg\r\n\r\n");
        out.extend_from_slice(b"fake image data\r\n");
        out.extend_from_slice(b"------strada-test--\r\n");
        out
    }

    fn chunked(bytes: Vec<u8>, size: usize) -> impl futures_util::Stream<Item = Result<Bytes, std::io::Error>> + Unpin {
        let chunks: Vec<Result<Bytes, std::io::Error>> = bytes
            .chunks(size)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        stream::iter(chunks)
    }

    #[tokio::test]
    async fn test_memory_upload_scenario() {
        let data = parse_multipart(CT, chunked(body(), 7), &MultipartConfig::default())
            .await
            .unwrap();

        assert_eq!(
            data.field("userId"),
            Some(&TextField::Single("123".to_string()))
        );

        let avatar = data.file("avatar").unwrap().first();
        assert_eq!(avatar.fieldname, "avatar");
        assert_eq!(avatar.originalname, "profile.jpg");
        assert_eq!(avatar.mimetype, "image/jpeg");
        assert_eq!(avatar.size, 15);
        assert_eq!(avatar.buffer.as_deref(), Some(&b"fake image data"[..]));
        assert!(avatar.temp_path.is_none());
    }

    #[tokio::test]
    async fn test_files_metadata_feeds_request_files() {
        let data = parse_multipart(CT, chunked(body(), 4096), &MultipartConfig::default())
            .await
            .unwrap();

        let metadata = data.files_metadata();
        assert_eq!(metadata["avatar"]["originalname"], "profile.jpg");
        assert_eq!(metadata["avatar"]["mimetype"], "image/jpeg");
        assert_eq!(metadata["avatar"]["size"], 15);
        assert_eq!(metadata["avatar"]["encoding"], "7bit");

        assert_eq!(data.fields_value(), json!({"userId": "123"}));
    }

    #[tokio::test]
    async fn test_temp_upload_leaves_file_for_the_caller() {
        let config = MultipartConfig {
            strategy: UploadStrategy::Temp,
            ..MultipartConfig::default()
        };
        let data = parse_multipart(CT, chunked(body(), 4096), &config).await.unwrap();

        let avatar = data.file("avatar").unwrap().first();
        assert!(avatar.buffer.is_none());
        let path = avatar.temp_path.clone().unwrap();
        assert_eq!(
            tokio::fs::read(&path).await.unwrap(),
            b"fake image data".to_vec()
        );
        tokio::fs::remove_file(path).await.unwrap();
    }

    #[tokio::test]
    async fn test_limit_breach_fails_the_parse() {
        let config = MultipartConfig {
            max_file_size: 4,
            ..MultipartConfig::default()
        };
        let err = parse_multipart(CT, chunked(body(), 4096), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, ParseError::FileTooLarge { .. }));
    }

    #[tokio::test]
    async fn test_transport_read_error_propagates() {
        let chunks: Vec<Result<Bytes, std::io::Error>> = vec![
            Ok(Bytes::from_static(b"------strada-test\r\n")),
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "peer went away",
            )),
        ];
        let err = parse_multipart(CT, stream::iter(chunks), &MultipartConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ParseError::Io(_)));
    }
}
