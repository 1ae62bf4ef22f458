/// Http protocol building blocks (REST client, request signing strategy).
pub mod http;
