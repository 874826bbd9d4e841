//! Integration tests for the HTTP collaborator gateway
//!
//! Tests request/response behavior against a wiremock server: happy paths
//! for every capability, fenced-JSON completions, retry on transient
//! failure, and error classification.

use serde_json::json;
use wiremock::{
    matchers::{header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use stratagem::candidate::{PlanStep, StrategyCandidate};
use stratagem::collab::http::PipeGateway;
use stratagem::collab::{
    EmbeddingProvider, Evaluator, FeedbackSummarizer, Generator, PairwiseJudge, Preference,
};
use stratagem::config::{PipeConfig, RemoteConfig, RequestConfig};
use stratagem::error::CollaboratorError;

/// Create a test gateway pointing at the mock server
fn create_test_gateway(base_url: &str, max_retries: u32) -> PipeGateway {
    let remote = RemoteConfig {
        api_key: "test-api-key".to_string(),
        base_url: base_url.to_string(),
    };
    let request_config = RequestConfig {
        timeout_ms: 5000,
        max_retries,
        retry_delay_ms: 10,
    };
    PipeGateway::new(&remote, request_config, PipeConfig::default())
        .expect("Failed to create gateway")
}

fn sample_candidate(title: &str) -> StrategyCandidate {
    StrategyCandidate::new(
        title,
        vec![PlanStep::new("Survey the market", "Market report ready")],
    )
}

fn candidate_completion(title: &str) -> String {
    json!({
        "title": title,
        "steps": [
            {"action": "Survey the market", "outcome": "Market report ready"},
            {"action": "Launch pilot", "outcome": "Pilot running"}
        ],
        "estimated_timeline": "2 quarters"
    })
    .to_string()
}

#[tokio::test]
async fn test_generate_parses_candidate() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/pipes/run"))
        .and(header("Authorization", "Bearer test-api-key"))
        .and(header("Content-Type", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "completion": candidate_completion("Northern expansion")
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let gateway = create_test_gateway(&mock_server.uri(), 0);
    let candidate = gateway
        .generate("enter the northern market", 0.7)
        .await
        .expect("generate failed");

    assert_eq!(candidate.title, "Northern expansion");
    assert_eq!(candidate.steps.len(), 2);
    assert_eq!(candidate.estimated_timeline, "2 quarters");
    // Defaults fill fields the completion omitted
    assert_eq!(candidate.steps[0].confidence, 0.8);
}

#[tokio::test]
async fn test_generate_parses_fenced_completion() {
    let mock_server = MockServer::start().await;

    let fenced = format!(
        "Here is the plan:\n```json\n{}\n```",
        candidate_completion("Fenced plan")
    );
    Mock::given(method("POST"))
        .and(path("/v1/pipes/run"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "completion": fenced
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let gateway = create_test_gateway(&mock_server.uri(), 0);
    let candidate = gateway.generate("prompt", 0.5).await.expect("generate failed");
    assert_eq!(candidate.title, "Fenced plan");
}

#[tokio::test]
async fn test_compare_maps_preference() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/pipes/run"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "completion": r#"{"preference": 2, "rationale": "tighter sequencing"}"#
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let gateway = create_test_gateway(&mock_server.uri(), 0);
    let judgment = gateway
        .compare(&sample_candidate("A"), &sample_candidate("B"), "ctx")
        .await
        .expect("compare failed");

    assert_eq!(judgment.preference, Preference::Second);
    assert_eq!(judgment.rationale, "tighter sequencing");
}

#[tokio::test]
async fn test_compare_rejects_out_of_range_preference() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/pipes/run"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "completion": r#"{"preference": 3}"#
        })))
        .mount(&mock_server)
        .await;

    let gateway = create_test_gateway(&mock_server.uri(), 0);
    let result = gateway
        .compare(&sample_candidate("A"), &sample_candidate("B"), "ctx")
        .await;

    assert!(matches!(
        result,
        Err(CollaboratorError::InvalidResponse { .. })
    ));
}

#[tokio::test]
async fn test_evaluate_combines_sub_scores() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/pipes/run"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "completion": json!({
                "coherence": 8.0,
                "feasibility": 6.0,
                "domain_alignment": 7.0,
                "risk_management": 5.0,
                "resource_efficiency": 9.0
            })
            .to_string()
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let gateway = create_test_gateway(&mock_server.uri(), 0);
    let metrics = gateway
        .evaluate(&sample_candidate("A"), "ctx")
        .await
        .expect("evaluate failed");

    assert_eq!(metrics.coherence, 8.0);
    assert_eq!(metrics.risk_management, 5.0);
    // 0.25*8 + 0.25*6 + 0.20*7 + 0.15*5 + 0.15*9
    assert!((metrics.overall_score - 7.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_summarize_parses_feedback() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/pipes/run"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "completion": json!({
                "strengths": ["coherent sequencing"],
                "weaknesses": ["no risk coverage"],
                "overall_assessment": "promising but risky",
                "confidence": 0.8,
                "priority_areas": ["risk_management"]
            })
            .to_string()
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let gateway = create_test_gateway(&mock_server.uri(), 0);
    let feedback = gateway.summarize("metrics report").await.expect("summarize failed");

    assert_eq!(feedback.strengths, vec!["coherent sequencing"]);
    assert_eq!(feedback.weaknesses, vec!["no risk coverage"]);
    assert_eq!(feedback.confidence, 0.8);
}

#[tokio::test]
async fn test_retry_then_success() {
    let mock_server = MockServer::start().await;

    // First attempt fails, the retry succeeds
    Mock::given(method("POST"))
        .and(path("/v1/pipes/run"))
        .respond_with(ResponseTemplate::new(500).set_body_string("transient"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/pipes/run"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "completion": candidate_completion("Recovered plan")
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let gateway = create_test_gateway(&mock_server.uri(), 2);
    let candidate = gateway.generate("prompt", 0.7).await.expect("generate failed");
    assert_eq!(candidate.title, "Recovered plan");
}

#[tokio::test]
async fn test_exhausted_retries_reports_unavailable() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/pipes/run"))
        .respond_with(ResponseTemplate::new(503).set_body_string("down"))
        .expect(2)
        .mount(&mock_server)
        .await;

    let gateway = create_test_gateway(&mock_server.uri(), 1);
    let result = gateway.generate("prompt", 0.7).await;

    match result {
        Err(CollaboratorError::Unavailable { message, retries }) => {
            assert_eq!(retries, 2);
            assert!(message.contains("503"), "message was: {}", message);
        }
        other => panic!("Expected Unavailable, got {:?}", other.map(|c| c.title)),
    }
}

#[tokio::test]
async fn test_embed_returns_vectors() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(header("Authorization", "Bearer test-api-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[1.0, 0.0], [0.0, 1.0]]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let gateway = create_test_gateway(&mock_server.uri(), 0);
    let texts = vec!["plan a".to_string(), "plan b".to_string()];
    let vectors = gateway.embed(&texts).await.expect("embed failed");

    assert_eq!(vectors.len(), 2);
    assert_eq!(vectors[0], vec![1.0, 0.0]);
}

#[tokio::test]
async fn test_embed_count_mismatch_is_invalid_response() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "embeddings": [[1.0, 0.0]]
        })))
        .mount(&mock_server)
        .await;

    let gateway = create_test_gateway(&mock_server.uri(), 0);
    let texts = vec!["plan a".to_string(), "plan b".to_string()];
    let result = gateway.embed(&texts).await;

    assert!(matches!(
        result,
        Err(CollaboratorError::InvalidResponse { .. })
    ));
}
