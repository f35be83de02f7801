//! SearchClient tests against a mock engine.

#[cfg(test)]
mod tests {
  use pretty_assertions::assert_eq;
  use serde_json::json;
  use wiremock::{
    Mock, ResponseTemplate,
    matchers::{body_json, header, method, path, query_param},
  };

  use crate::{
    config::TaskConfig,
    query::QueryParams,
    search::{
      SearchClient, SearchError,
      __tests__::helpers::{API_KEY, SearchTestContext, task_info, task_json},
      types::TaskStatus,
    },
  };

  #[tokio::test]
  async fn test_empty_host_is_rejected() {
    let err = SearchClient::new("  ", None, std::time::Duration::from_secs(1), TaskConfig::default()).unwrap_err();
    assert!(matches!(err, SearchError::InvalidParameter(_)));
  }

  #[tokio::test]
  async fn test_requests_carry_bearer_token() {
    let ctx = SearchTestContext::new().await;
    Mock::given(method("GET"))
      .and(path("/indexes/movies/stats"))
      .and(header("authorization", format!("Bearer {API_KEY}").as_str()))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "numberOfDocuments": 12,
        "isIndexing": false,
        "fieldDistribution": {"title": 12, "year": 10}
      })))
      .expect(1)
      .mount(&ctx.server)
      .await;

    let stats = ctx.client().stats("movies").await.unwrap();
    assert_eq!(stats.number_of_documents, 12);
    assert!(!stats.is_indexing);
    assert_eq!(stats.field_distribution["year"], 10);
  }

  #[tokio::test]
  async fn test_wait_for_task_polls_until_terminal() {
    let ctx = SearchTestContext::new().await;
    Mock::given(method("GET"))
      .and(path("/tasks/4"))
      .respond_with(ResponseTemplate::new(200).set_body_json(task_json(4, "processing", None)))
      .up_to_n_times(2)
      .expect(2)
      .mount(&ctx.server)
      .await;
    ctx.mount_task(4, "succeeded", None).await;

    let task = ctx.client().wait_for_task(4).await.unwrap();
    assert_eq!(task.uid, 4);
    assert_eq!(task.status, TaskStatus::Succeeded);
  }

  #[tokio::test]
  async fn test_failed_task_reports_engine_code() {
    let ctx = SearchTestContext::new().await;
    ctx
      .mount_task(8, "failed", Some(("invalid_document_id", "Document identifier `a b` is invalid.")))
      .await;

    let err = ctx.client().wait_for_task(8).await.unwrap_err();
    match err {
      SearchError::TaskFailed { uid, code, .. } => {
        assert_eq!(uid, 8);
        assert_eq!(code, "invalid_document_id");
      }
      other => panic!("unexpected error: {other:?}"),
    }
  }

  #[tokio::test]
  async fn test_task_wait_times_out() {
    let ctx = SearchTestContext::new().await;
    Mock::given(method("GET"))
      .and(path("/tasks/2"))
      .respond_with(ResponseTemplate::new(200).set_body_json(task_json(2, "enqueued", None)))
      .mount(&ctx.server)
      .await;

    let tasks = TaskConfig {
      poll_interval_ms: 5,
      timeout_secs: 0,
    };
    let client = SearchClient::new(&ctx.server.uri(), None, std::time::Duration::from_secs(5), tasks).unwrap();
    let err = client.wait_for_task(2).await.unwrap_err();
    assert!(matches!(err, SearchError::TaskTimeout { uid: 2, .. }));
  }

  #[tokio::test]
  async fn test_non_success_maps_to_api_error() {
    let ctx = SearchTestContext::new().await;
    Mock::given(method("POST"))
      .and(path("/indexes/movies/search"))
      .respond_with(ResponseTemplate::new(400).set_body_json(json!({
        "message": "Attribute `genre` is not filterable.",
        "code": "invalid_search_filter",
        "type": "invalid_request",
        "link": "https://docs.meilisearch.com/errors#invalid_search_filter"
      })))
      .mount(&ctx.server)
      .await;

    let params = QueryParams::new("").with_filter("genre = drama");
    let err = ctx.client().search("movies", &params).await.unwrap_err();
    match &err {
      SearchError::Api { status, code, .. } => {
        assert_eq!(*status, 400);
        assert_eq!(code, "invalid_search_filter");
      }
      other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(err.code(), Some("invalid_search_filter"));
  }

  #[tokio::test]
  async fn test_search_sends_paging_and_returns_facets() {
    let ctx = SearchTestContext::new().await;
    Mock::given(method("POST"))
      .and(path("/indexes/movies/search"))
      .and(body_json(json!({
        "q": "space",
        "page": 2,
        "hitsPerPage": 5,
        "facets": ["genre"],
        "sort": ["year:desc"]
      })))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({
        "hits": [{"id": "7", "title": "Space Odyssey"}],
        "query": "space",
        "page": 2,
        "hitsPerPage": 5,
        "totalHits": 6,
        "totalPages": 2,
        "facetDistribution": {"genre": {"sci-fi": 5, "drama": 1}}
      })))
      .expect(1)
      .mount(&ctx.server)
      .await;

    let mut params = QueryParams::new("space").with_facets(["genre"]).with_page(2, 5);
    params.sort = vec!["year:desc".to_string()];

    let page = ctx.client().search("movies", &params).await.unwrap();
    assert_eq!(page.total, 6);
    assert_eq!(page.hits.len(), 1);
    assert_eq!(page.facets["genre"]["sci-fi"], 5);
  }

  #[tokio::test]
  async fn test_get_document_missing_is_none() {
    let ctx = SearchTestContext::new().await;
    Mock::given(method("GET"))
      .and(path("/indexes/movies/documents/404"))
      .respond_with(ResponseTemplate::new(404).set_body_json(json!({
        "message": "Document `404` not found.",
        "code": "document_not_found"
      })))
      .mount(&ctx.server)
      .await;

    assert_eq!(ctx.client().get_document("movies", "404").await.unwrap(), None);
  }

  #[tokio::test]
  async fn test_get_document_id_stays_in_its_segment() {
    let ctx = SearchTestContext::new().await;
    Mock::given(method("GET"))
      .and(path("/keys"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": [{"key": "admin"}]})))
      .expect(0)
      .mount(&ctx.server)
      .await;
    Mock::given(method("GET"))
      .and(path("/indexes/movies/documents/a"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "a"})))
      .expect(0)
      .mount(&ctx.server)
      .await;
    Mock::given(method("GET"))
      .and(path("/indexes/movies/documents/a%23zzz"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "a#zzz"})))
      .expect(1)
      .mount(&ctx.server)
      .await;

    let client = ctx.client();
    assert_eq!(client.get_document("movies", "../../../keys").await.unwrap(), None);
    assert_eq!(
      client.get_document("movies", "a#zzz").await.unwrap(),
      Some(json!({"id": "a#zzz"}))
    );

    ctx.server.verify().await;
  }

  #[tokio::test]
  async fn test_relative_path_segments_are_rejected() {
    let ctx = SearchTestContext::new().await;
    let client = ctx.client();

    let err = client.get_document("movies", "..").await.unwrap_err();
    assert!(matches!(err, SearchError::InvalidParameter(_)));
    let err = client.stats("..").await.unwrap_err();
    assert!(matches!(err, SearchError::InvalidParameter(_)));
    assert!(ctx.server.received_requests().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_add_documents_passes_primary_key() {
    let ctx = SearchTestContext::new().await;
    Mock::given(method("POST"))
      .and(path("/indexes/movies/documents"))
      .and(query_param("primaryKey", "movie_id"))
      .respond_with(ResponseTemplate::new(202).set_body_json(task_info(11, "documentAdditionOrUpdate")))
      .expect(1)
      .mount(&ctx.server)
      .await;

    let info = ctx
      .client()
      .add_documents("movies", "movie_id", &json!([{"movie_id": "1"}]))
      .await
      .unwrap();
    assert_eq!(info.task_uid, 11);
    assert_eq!(info.status, TaskStatus::Enqueued);
  }

  #[tokio::test]
  async fn test_primary_key_is_query_encoded() {
    let ctx = SearchTestContext::new().await;
    Mock::given(method("PUT"))
      .and(path("/indexes/movies/documents"))
      .and(query_param("primaryKey", "id&primaryKey=evil"))
      .respond_with(ResponseTemplate::new(202).set_body_json(task_info(12, "documentAdditionOrUpdate")))
      .expect(1)
      .mount(&ctx.server)
      .await;

    let info = ctx
      .client()
      .update_documents("movies", "id&primaryKey=evil", &json!([{"id": "1"}]))
      .await
      .unwrap();
    assert_eq!(info.task_uid, 12);
  }
}
