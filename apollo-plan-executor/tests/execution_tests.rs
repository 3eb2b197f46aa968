mod common;

use std::sync::Arc;
use std::time::Duration;

use apollo_plan_executor::configuration::Subscription;
use apollo_plan_executor::configuration::Telemetry;
use apollo_plan_executor::error::ExecutionError;
use apollo_plan_executor::error::FetchError;
use apollo_plan_executor::graphql::Response;
use apollo_plan_executor::json_ext::Value;
use apollo_plan_executor::plan::FetchNode;
use apollo_plan_executor::plan::Operation;
use apollo_plan_executor::plan::OperationKind;
use apollo_plan_executor::plan::SubscribeNode;
use apollo_plan_executor::plan::TypeBranchNode;
use apollo_plan_executor::spec::coerce_variable_values;
use apollo_plan_executor::spec::InputFieldDefinition;
use apollo_plan_executor::spec::InputValue;
use apollo_plan_executor::spec::SchemaTypes;
use apollo_plan_executor::spec::VariableDefinition;
use apollo_plan_executor::Configuration;
use apollo_plan_executor::ExecutionRequest;
use apollo_plan_executor::OperationPlan;
use apollo_plan_executor::OperationPlanExecutor;
use apollo_plan_executor::SubgraphRegistry;
use common::requires;
use common::Calls;
use common::MockSubgraph;
use futures::StreamExt;
use maplit::hashmap;
use pretty_assertions::assert_eq;
use serde_json_bytes::json;
use tokio_util::sync::CancellationToken;

const TOP_PRODUCTS: &str = "{ topProducts { __typename upc } }";
const PRODUCT_REVIEWS: &str = "query($representations:[_Any!]!){_entities(representations:$representations){...on Product{reviews{body}}}}";
const PRODUCT_STOCK: &str = "query($representations:[_Any!]!){_entities(representations:$representations){...on Product{inStock}}}";
const PRODUCT_REVIEW_AUTHORS: &str = "query($representations:[_Any!]!){_entities(representations:$representations){...on Product{reviews{author}}}}";

fn schema() -> SchemaTypes {
    SchemaTypes::new()
        .object("Product")
        .object("Book")
        .object("Movie")
        .object("Review")
        .union("SearchResult", ["Book", "Movie"])
        .enum_type("SortOrder", ["ASC", "DESC"])
        .input_object(
            "ProductFilter",
            [
                ("sort", InputFieldDefinition::new("SortOrder".parse().unwrap())),
                ("limit", InputFieldDefinition::new("Int".parse().unwrap())),
            ],
        )
}

fn executor(configuration: Configuration, subgraphs: SubgraphRegistry) -> OperationPlanExecutor {
    OperationPlanExecutor::new(configuration, subgraphs, Arc::new(schema()))
}

fn request(plan: OperationPlan) -> ExecutionRequest {
    ExecutionRequest::builder().plan(Arc::new(plan)).build()
}

fn products(calls: &Calls) -> MockSubgraph {
    MockSubgraph::new("products", calls).with_data(
        TOP_PRODUCTS,
        json!({"topProducts": [
            {"__typename": "Product", "upc": "1"},
            {"__typename": "Product", "upc": "2"}
        ]}),
    )
}

fn reviews(calls: &Calls) -> MockSubgraph {
    MockSubgraph::new("reviews", calls).with_data(
        PRODUCT_REVIEWS,
        json!({"_entities": [{"reviews": [{"body": "great"}]}, {"reviews": []}]}),
    )
}

fn inventory(calls: &Calls) -> MockSubgraph {
    MockSubgraph::new("inventory", calls).with_data(
        PRODUCT_STOCK,
        json!({"_entities": [{"inStock": true}, {"inStock": false}]}),
    )
}

/// `topProducts` from products, then their reviews and their stock in parallel.
fn top_products_plan() -> OperationPlan {
    OperationPlan::builder()
        .node(FetchNode::new(1, "products", TOP_PRODUCTS), [])
        .node(
            FetchNode::new(2, "reviews", PRODUCT_REVIEWS)
                .with_path("/topProducts/@")
                .with_requires(requires("Product", &["upc"])),
            [1],
        )
        .node(
            FetchNode::new(3, "inventory", PRODUCT_STOCK)
                .with_path("/topProducts/@")
                .with_requires(requires("Product", &["upc"])),
            [1],
        )
        .build(Operation::new(OperationKind::Query).with_name("TopProducts"))
        .unwrap()
}

fn codes(response: &Response) -> Vec<&str> {
    response
        .errors
        .iter()
        .map(|error| error.extension_code().unwrap_or_default())
        .collect()
}

fn paths(response: &Response) -> Vec<Option<String>> {
    response
        .errors
        .iter()
        .map(|error| error.path.as_ref().map(ToString::to_string))
        .collect()
}

#[test_log::test(tokio::test)]
async fn query_merges_every_fragment() {
    let calls = Calls::default();
    let subgraphs = SubgraphRegistry::new()
        .with_subgraph("products", products(&calls))
        .with_subgraph("reviews", reviews(&calls))
        .with_subgraph("inventory", inventory(&calls));

    let response = executor(Configuration::default(), subgraphs)
        .query(request(top_products_plan()))
        .await
        .unwrap();

    assert!(response.errors.is_empty(), "{:?}", response.errors);
    assert_eq!(
        response.data,
        Some(json!({"topProducts": [
            {"__typename": "Product", "upc": "1", "reviews": [{"body": "great"}], "inStock": true},
            {"__typename": "Product", "upc": "2", "reviews": [], "inStock": false}
        ]}))
    );
    assert_eq!(
        calls.totals(),
        hashmap! {
            "products".to_string() => 1,
            "reviews".to_string() => 1,
            "inventory".to_string() => 1,
        }
    );
}

#[test_log::test(tokio::test)]
async fn root_failure_skips_every_dependent() {
    let calls = Calls::default();
    let subgraphs = SubgraphRegistry::new()
        .with_subgraph(
            "products",
            MockSubgraph::new("products", &calls).with_error(
                TOP_PRODUCTS,
                FetchError::SubrequestHttpError {
                    status_code: Some(500),
                    service: "products".to_string(),
                    reason: "internal server error".to_string(),
                },
            ),
        )
        .with_subgraph("reviews", reviews(&calls))
        .with_subgraph("inventory", inventory(&calls));

    let response = executor(Configuration::default(), subgraphs)
        .query(request(top_products_plan()))
        .await
        .unwrap();

    assert_eq!(response.data, Some(Value::Null));
    assert_eq!(
        codes(&response),
        vec!["SUBREQUEST_HTTP_ERROR", "NODE_SKIPPED", "NODE_SKIPPED"]
    );
    assert_eq!(
        paths(&response),
        vec![
            None,
            Some("/topProducts/@".to_string()),
            Some("/topProducts/@".to_string())
        ]
    );
    assert_eq!(
        calls.totals(),
        hashmap! {
            "products".to_string() => 1,
        }
    );
}

#[test_log::test(tokio::test)]
async fn failure_is_contained_to_its_subtree() {
    let calls = Calls::default();
    let subgraphs = SubgraphRegistry::new()
        .with_subgraph("products", products(&calls))
        .with_subgraph(
            "reviews",
            MockSubgraph::new("reviews", &calls).with_error(
                PRODUCT_REVIEWS,
                FetchError::SubrequestHttpError {
                    status_code: Some(503),
                    service: "reviews".to_string(),
                    reason: "service unavailable".to_string(),
                },
            ),
        )
        .with_subgraph("inventory", inventory(&calls))
        .with_subgraph("accounts", MockSubgraph::new("accounts", &calls));

    let plan = OperationPlan::builder()
        .node(FetchNode::new(1, "products", TOP_PRODUCTS), [])
        .node(
            FetchNode::new(2, "reviews", PRODUCT_REVIEWS)
                .with_path("/topProducts/@")
                .with_requires(requires("Product", &["upc"])),
            [1],
        )
        .node(
            FetchNode::new(3, "inventory", PRODUCT_STOCK)
                .with_path("/topProducts/@")
                .with_requires(requires("Product", &["upc"])),
            [1],
        )
        .node(
            FetchNode::new(4, "accounts", PRODUCT_REVIEW_AUTHORS)
                .with_path("/topProducts/@")
                .with_requires(requires("Product", &["upc"])),
            [2],
        )
        .build(Operation::new(OperationKind::Query))
        .unwrap();

    let response = executor(Configuration::default(), subgraphs)
        .query(request(plan))
        .await
        .unwrap();

    assert_eq!(
        response.data,
        Some(json!({"topProducts": [
            {"__typename": "Product", "upc": "1", "inStock": true},
            {"__typename": "Product", "upc": "2", "inStock": false}
        ]}))
    );
    assert_eq!(codes(&response), vec!["SUBREQUEST_HTTP_ERROR", "NODE_SKIPPED"]);
    assert_eq!(
        calls.totals(),
        hashmap! {
            "products".to_string() => 1,
            "inventory".to_string() => 1,
        }
    );
}

#[test_log::test(tokio::test)]
async fn independent_nodes_run_concurrently() {
    let calls = Calls::default();
    let delay = Duration::from_millis(100);
    let subgraphs = SubgraphRegistry::new()
        .with_subgraph("products", products(&calls))
        .with_subgraph("reviews", reviews(&calls).with_delay(delay))
        .with_subgraph("inventory", inventory(&calls).with_delay(delay));

    let response = executor(Configuration::default(), subgraphs)
        .query(request(top_products_plan()))
        .await
        .unwrap();
    assert!(response.errors.is_empty());

    let log = calls.log();
    let position = |entry: &str| log.iter().position(|e| e == entry).unwrap();
    let first_end = position("end reviews").min(position("end inventory"));
    assert!(position("start reviews") < first_end, "{log:?}");
    assert!(position("start inventory") < first_end, "{log:?}");
    assert!(position("end products") < position("start reviews"), "{log:?}");
}

#[test_log::test(tokio::test)]
async fn mutation_roots_run_one_after_the_other() {
    const CREATE_PRODUCT: &str = "mutation { createProduct { __typename upc } }";
    const CREATED_REVIEWS: &str = "query($representations:[_Any!]!){_entities(representations:$representations){...on Product{reviews{body}}}}";
    const RESTOCK: &str = "mutation { restock { __typename upc } }";
    const STOCK: &str = "query($representations:[_Any!]!){_entities(representations:$representations){...on Product{stock}}}";

    let calls = Calls::default();
    let delay = Duration::from_millis(20);
    let subgraphs = SubgraphRegistry::new()
        .with_subgraph(
            "products",
            MockSubgraph::new("products", &calls)
                .with_delay(delay)
                .with_data(
                    CREATE_PRODUCT,
                    json!({"createProduct": {"__typename": "Product", "upc": "8"}}),
                ),
        )
        .with_subgraph(
            "reviews",
            MockSubgraph::new("reviews", &calls)
                .with_delay(delay)
                .with_data(CREATED_REVIEWS, json!({"_entities": [{"reviews": []}]})),
        )
        .with_subgraph(
            "inventory",
            MockSubgraph::new("inventory", &calls)
                .with_delay(delay)
                .with_data(
                    RESTOCK,
                    json!({"restock": {"__typename": "Product", "upc": "8"}}),
                ),
        )
        .with_subgraph(
            "accounts",
            MockSubgraph::new("accounts", &calls)
                .with_delay(delay)
                .with_data(STOCK, json!({"_entities": [{"stock": 5}]})),
        );

    let plan = OperationPlan::builder()
        .node(FetchNode::new(1, "products", CREATE_PRODUCT), [])
        .node(
            FetchNode::new(2, "reviews", CREATED_REVIEWS)
                .with_path("/createProduct")
                .with_requires(requires("Product", &["upc"])),
            [1],
        )
        .node(FetchNode::new(3, "inventory", RESTOCK), [])
        .node(
            FetchNode::new(4, "accounts", STOCK)
                .with_path("/restock")
                .with_requires(requires("Product", &["upc"])),
            [3],
        )
        .build(Operation::new(OperationKind::Mutation))
        .unwrap();

    let response = executor(Configuration::default(), subgraphs)
        .mutation(request(plan))
        .await
        .unwrap();

    assert!(response.errors.is_empty(), "{:?}", response.errors);
    assert_eq!(
        response.data,
        Some(json!({
            "createProduct": {"__typename": "Product", "upc": "8", "reviews": []},
            "restock": {"__typename": "Product", "upc": "8", "stock": 5}
        }))
    );
    assert_eq!(
        calls.log(),
        vec![
            "start products",
            "end products",
            "start reviews",
            "end reviews",
            "start inventory",
            "end inventory",
            "start accounts",
            "end accounts",
        ]
    );
}

const SEARCH: &str = "{ search { __typename id } }";
const BOOKS: &str = "query($representations:[_Any!]!){_entities(representations:$representations){...on Book{title}}}";
const MOVIES: &str = "query($representations:[_Any!]!){_entities(representations:$representations){...on Movie{director}}}";

/// `search` results, then the details of books and movies depending on their type.
fn search_plan() -> OperationPlan {
    OperationPlan::builder()
        .node(FetchNode::new(1, "search", SEARCH), [])
        .node(
            TypeBranchNode::new(2, "/search/@")
                .with_branch("Book", 3)
                .with_branch("Movie", 4),
            [1],
        )
        .node(
            FetchNode::new(3, "books", BOOKS)
                .with_path("/search/@/... on Book")
                .with_requires(requires("Book", &["id"])),
            [2],
        )
        .node(
            FetchNode::new(4, "movies", MOVIES)
                .with_path("/search/@/... on Movie")
                .with_requires(requires("Movie", &["id"])),
            [2],
        )
        .build(Operation::new(OperationKind::Query))
        .unwrap()
}

fn search_subgraphs(calls: &Calls, search: Value) -> SubgraphRegistry {
    SubgraphRegistry::new()
        .with_subgraph(
            "search",
            MockSubgraph::new("search", calls).with_data(SEARCH, search),
        )
        .with_subgraph(
            "books",
            MockSubgraph::new("books", calls).with_data(
                BOOKS,
                json!({"_entities": [{"title": "Dune"}, {"title": "Emma"}]}),
            ),
        )
        .with_subgraph("movies", MockSubgraph::new("movies", calls))
}

#[test_log::test(tokio::test)]
async fn type_branch_only_runs_matching_fetches() {
    let calls = Calls::default();
    let subgraphs = search_subgraphs(
        &calls,
        json!({"search": [
            {"__typename": "Book", "id": "b1"},
            {"__typename": "Book", "id": "b2"}
        ]}),
    );

    let response = executor(Configuration::default(), subgraphs)
        .query(request(search_plan()))
        .await
        .unwrap();

    assert!(response.errors.is_empty(), "{:?}", response.errors);
    assert_eq!(
        response.data,
        Some(json!({"search": [
            {"__typename": "Book", "id": "b1", "title": "Dune"},
            {"__typename": "Book", "id": "b2", "title": "Emma"}
        ]}))
    );
    assert_eq!(
        calls.totals(),
        hashmap! {
            "search".to_string() => 1,
            "books".to_string() => 1,
        }
    );
}

#[test_log::test(tokio::test)]
async fn type_branch_over_no_results_is_not_an_error() {
    for search in [json!({"search": []}), json!({"search": null})] {
        let calls = Calls::default();
        let subgraphs = search_subgraphs(&calls, search.clone());

        let response = executor(Configuration::default(), subgraphs)
            .query(request(search_plan()))
            .await
            .unwrap();

        assert!(response.errors.is_empty(), "{:?}", response.errors);
        assert_eq!(response.data, Some(search));
        assert_eq!(
            calls.totals(),
            hashmap! {
                "search".to_string() => 1,
            }
        );
    }
}

#[test_log::test(tokio::test)]
async fn invalid_variables_fail_before_any_fetch() {
    let calls = Calls::default();
    let subgraphs = SubgraphRegistry::new().with_subgraph("products", products(&calls));
    let plan = OperationPlan::builder()
        .node(
            FetchNode::new(1, "products", TOP_PRODUCTS).with_variable_usages(["id"]),
            [],
        )
        .build(
            Operation::new(OperationKind::Query)
                .with_variable("id", VariableDefinition::new("ID!".parse().unwrap())),
        )
        .unwrap();

    let response = executor(Configuration::default(), subgraphs)
        .query(request(plan))
        .await
        .unwrap();

    assert_eq!(response.data, None);
    assert_eq!(codes(&response), vec!["NON_NULL_VIOLATION"]);
    assert_eq!(
        response.errors[0].extensions.get("variable"),
        Some(&json!("id"))
    );
    assert!(calls.log().is_empty());
}

#[test]
fn enum_variables_are_told_apart_from_strings() {
    let operation = Operation::new(OperationKind::Query)
        .with_variable("filter", VariableDefinition::new("ProductFilter".parse().unwrap()))
        .with_variable("name", VariableDefinition::new("String".parse().unwrap()));
    let supplied = json!({"filter": {"sort": "ASC", "limit": 1}, "name": "ASC"});

    let coerced =
        coerce_variable_values(&operation.variables, supplied.as_object().unwrap(), &schema())
            .unwrap();

    assert_eq!(
        coerced.get("filter").unwrap().value,
        InputValue::Object(
            [
                ("sort".to_string(), InputValue::Enum("ASC".to_string())),
                ("limit".to_string(), InputValue::Int(1)),
            ]
            .into_iter()
            .collect()
        )
    );
    assert_eq!(
        coerced.get("name").unwrap().value,
        InputValue::String("ASC".to_string())
    );
}

#[test_log::test(tokio::test)]
async fn timeout_discards_partial_data() {
    let calls = Calls::default();
    let subgraphs = SubgraphRegistry::new()
        .with_subgraph("products", products(&calls))
        .with_subgraph(
            "reviews",
            reviews(&calls).with_delay(Duration::from_secs(5)),
        )
        .with_subgraph("inventory", inventory(&calls));
    let configuration = Configuration::builder()
        .timeout(Duration::from_millis(50))
        .build()
        .unwrap();

    let response = executor(configuration, subgraphs)
        .query(request(top_products_plan()))
        .await
        .unwrap();

    assert_eq!(response.data, None);
    assert_eq!(codes(&response), vec!["EXECUTION_TIMEOUT"]);
}

#[test_log::test(tokio::test)]
async fn caller_cancellation_returns_an_error() {
    let calls = Calls::default();
    let subgraphs = SubgraphRegistry::new().with_subgraph(
        "products",
        products(&calls).with_delay(Duration::from_secs(5)),
    );
    let plan = OperationPlan::builder()
        .node(FetchNode::new(1, "products", TOP_PRODUCTS), [])
        .build(Operation::new(OperationKind::Query))
        .unwrap();
    let cancellation = CancellationToken::new();
    let request = ExecutionRequest::builder()
        .plan(Arc::new(plan))
        .cancellation(cancellation.clone())
        .build();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancellation.cancel();
    });
    let result = executor(Configuration::default(), subgraphs)
        .query(request)
        .await;

    assert!(matches!(result, Err(ExecutionError::Cancelled)));
}

#[test_log::test(tokio::test)]
async fn dropping_the_query_stops_its_fetches() {
    let calls = Calls::default();
    let subgraphs = SubgraphRegistry::new()
        .with_subgraph("products", products(&calls))
        .with_subgraph(
            "reviews",
            reviews(&calls).with_delay(Duration::from_millis(200)),
        )
        .with_subgraph("inventory", inventory(&calls));
    let executor = executor(Configuration::default(), subgraphs);

    let result = tokio::time::timeout(
        Duration::from_millis(50),
        executor.query(request(top_products_plan())),
    )
    .await;
    assert!(result.is_err());

    tokio::time::sleep(Duration::from_millis(400)).await;
    let log = calls.log();
    assert!(log.contains(&"start reviews".to_string()), "{log:?}");
    assert!(!log.contains(&"end reviews".to_string()), "{log:?}");
    assert!(!executor.is_shut_down());
}

#[test_log::test(tokio::test)]
async fn shutdown_keeps_what_was_fetched() {
    let calls = Calls::default();
    let subgraphs = SubgraphRegistry::new()
        .with_subgraph("products", products(&calls))
        .with_subgraph(
            "reviews",
            reviews(&calls).with_delay(Duration::from_secs(5)),
        );
    let plan = OperationPlan::builder()
        .node(FetchNode::new(1, "products", TOP_PRODUCTS), [])
        .node(
            FetchNode::new(2, "reviews", PRODUCT_REVIEWS)
                .with_path("/topProducts/@")
                .with_requires(requires("Product", &["upc"])),
            [1],
        )
        .build(Operation::new(OperationKind::Query))
        .unwrap();
    let executor = executor(Configuration::default(), subgraphs);

    let handle = tokio::spawn({
        let executor = executor.clone();
        async move { executor.query(request(plan)).await }
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    executor.shutdown();
    let response = handle.await.unwrap().unwrap();

    assert!(executor.is_shut_down());
    assert_eq!(
        response.data,
        Some(json!({"topProducts": [
            {"__typename": "Product", "upc": "1"},
            {"__typename": "Product", "upc": "2"}
        ]}))
    );
    assert_eq!(codes(&response), vec!["NODE_NOT_EXECUTED"]);
    assert_eq!(paths(&response), vec![Some("/topProducts/@".to_string())]);
}

#[test_log::test(tokio::test)]
async fn trace_is_exposed_when_enabled() {
    let calls = Calls::default();
    let subgraphs = SubgraphRegistry::new()
        .with_subgraph("products", products(&calls))
        .with_subgraph("reviews", reviews(&calls))
        .with_subgraph("inventory", inventory(&calls));
    let configuration = Configuration::builder()
        .telemetry(Telemetry { expose_trace: true })
        .build()
        .unwrap();

    let response = executor(configuration, subgraphs)
        .query(request(top_products_plan()))
        .await
        .unwrap();

    let trace = response
        .extensions
        .get("executionTrace")
        .and_then(Value::as_array)
        .unwrap();
    assert_eq!(trace.len(), 3);
    assert_eq!(trace[0]["node"], json!(1));
    assert!(trace
        .iter()
        .all(|node| node["status"] == json!("SUCCESS")));

    let untraced = executor(
        Configuration::default(),
        SubgraphRegistry::new()
            .with_subgraph("products", products(&calls))
            .with_subgraph("reviews", reviews(&calls))
            .with_subgraph("inventory", inventory(&calls)),
    )
    .query(request(top_products_plan()))
    .await
    .unwrap();
    assert!(untraced.extensions.is_empty());
}

#[test_log::test(tokio::test)]
async fn subscription_resolves_every_event() {
    const REVIEW_ADDED: &str = "subscription { reviewAdded { __typename id } }";
    const AUTHOR: &str = "query($representations:[_Any!]!){_entities(representations:$representations){...on Review{author}}}";

    let calls = Calls::default();
    let subgraphs = SubgraphRegistry::new()
        .with_subgraph(
            "reviews",
            MockSubgraph::new("reviews", &calls).with_events(vec![
                json!({"reviewAdded": {"__typename": "Review", "id": "1"}}),
                json!({"reviewAdded": {"__typename": "Review", "id": "2"}}),
                json!({"reviewAdded": {"__typename": "Review", "id": "3"}}),
            ]),
        )
        .with_subgraph(
            "accounts",
            MockSubgraph::new("accounts", &calls)
                .with_data(AUTHOR, json!({"_entities": [{"author": "Ada"}]})),
        );
    let plan = OperationPlan::builder()
        .node(SubscribeNode::new(1, "reviews", REVIEW_ADDED), [])
        .node(
            FetchNode::new(2, "accounts", AUTHOR)
                .with_path("/reviewAdded")
                .with_requires(requires("Review", &["id"])),
            [1],
        )
        .build(Operation::new(OperationKind::Subscription))
        .unwrap();
    let configuration = Configuration::builder()
        .subscription(Subscription {
            max_events: Some(2),
        })
        .build()
        .unwrap();

    let responses = executor(configuration, subgraphs)
        .execute(request(plan))
        .await
        .unwrap()
        .collect::<Vec<_>>()
        .await;

    assert_eq!(
        responses
            .into_iter()
            .map(|response| response.data)
            .collect::<Vec<_>>(),
        vec![
            Some(json!({"reviewAdded": {"__typename": "Review", "id": "1", "author": "Ada"}})),
            Some(json!({"reviewAdded": {"__typename": "Review", "id": "2", "author": "Ada"}})),
        ]
    );
    assert_eq!(
        calls.totals(),
        hashmap! {
            "accounts".to_string() => 2,
        }
    );
}

#[test_log::test(tokio::test)]
async fn operation_kind_must_match_the_entry_point() {
    let calls = Calls::default();
    let executor = executor(
        Configuration::default(),
        SubgraphRegistry::new().with_subgraph("products", products(&calls)),
    );

    let result = executor.mutation(request(top_products_plan())).await;
    assert!(matches!(
        result,
        Err(ExecutionError::UnsupportedOperation {
            kind: OperationKind::Query
        })
    ));

    let not_a_subscription = OperationPlan::builder()
        .node(FetchNode::new(1, "products", TOP_PRODUCTS), [])
        .build(Operation::new(OperationKind::Subscription))
        .unwrap();
    let result = executor.subscribe(request(not_a_subscription)).await;
    assert!(matches!(
        result,
        Err(ExecutionError::InvalidSubscriptionPlan { .. })
    ));
    assert!(calls.log().is_empty());
}
