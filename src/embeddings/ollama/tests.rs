use super::*;

#[test]
fn client_configuration() {
    let config = OllamaConfig {
        protocol: "http".to_string(),
        host: "test-host".to_string(),
        port: 1234,
        model: "test-model".to_string(),
        embedding_dimension: 512,
    };
    let client = OllamaClient::new(&config).expect("Failed to create client");

    assert_eq!(client.model, "test-model");
    assert_eq!(client.embedding_dimension, 512);
    assert_eq!(client.base_url.host_str(), Some("test-host"));
    assert_eq!(client.base_url.port(), Some(1234));
    assert_eq!(client.retry_attempts, DEFAULT_RETRY_ATTEMPTS);
}

#[test]
fn client_builder_methods() {
    let config = OllamaConfig::default();
    let client = OllamaClient::new(&config)
        .expect("Failed to create client")
        .with_retry_attempts(5);

    assert_eq!(client.retry_attempts, 5);
}

#[test]
fn client_rejects_unparseable_host() {
    let config = OllamaConfig {
        host: "not a valid host".to_string(),
        ..Default::default()
    };

    assert!(OllamaClient::new(&config).is_err());
}

#[test]
fn provider_reports_configured_dimension() {
    let config = OllamaConfig {
        embedding_dimension: 768,
        ..Default::default()
    };
    let client = OllamaClient::new(&config).expect("Failed to create client");
    let provider: &dyn EmbeddingProvider = &client;

    assert_eq!(provider.dimension(), 768);
}

#[test]
fn batch_request_uses_input_field() {
    let request = BatchEmbedRequest {
        model: "nomic-embed-text:latest".to_string(),
        inputs: vec!["first".to_string(), "second".to_string()],
    };

    let json = serde_json::to_value(&request).expect("request should serialize");
    assert_eq!(json["model"], "nomic-embed-text:latest");
    assert_eq!(json["input"][0], "first");
    assert_eq!(json["input"][1], "second");
    assert!(json.get("inputs").is_none());
}

#[test]
fn embed_response_deserializes() {
    let body = r#"{"embedding": [0.1, 0.2, 0.3]}"#;
    let response: EmbedResponse = serde_json::from_str(body).expect("response should parse");

    assert_eq!(response.embedding, vec![0.1, 0.2, 0.3]);
}

#[test]
fn batch_embed_response_deserializes() {
    let body = r#"{"embeddings": [[0.1, 0.2], [0.3, 0.4]]}"#;
    let response: BatchEmbedResponse = serde_json::from_str(body).expect("response should parse");

    assert_eq!(response.embeddings.len(), 2);
    assert_eq!(response.embeddings[1], vec![0.3, 0.4]);
}

#[test]
fn models_response_tolerates_missing_optional_fields() {
    let body = r#"{"models": [{"name": "nomic-embed-text:latest"}]}"#;
    let response: ModelsResponse = serde_json::from_str(body).expect("response should parse");

    assert_eq!(response.models.len(), 1);
    assert_eq!(response.models[0].name, "nomic-embed-text:latest");
    assert!(response.models[0].size.is_none());
    assert!(response.models[0].digest.is_none());
}
