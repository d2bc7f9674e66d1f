//! Demo: parses a raw HTTP request with `httparse`, signs it with an HMAC
//! key, then verifies the signature it just produced. Not part of the
//! library's public surface; a worked example of implementing
//! [`httpsig::HttpMessageAdapter`] over a concrete request representation.

use std::collections::BTreeMap;

use httpsig::{
    HttpMessageAdapter, KeyConfig, KeyManager, MacAlgorithm, MessageContext, RequestTarget,
    SignatureOptions, SignatureScheme, TimestampOptions,
};

struct RawRequest {
    method: String,
    path: String,
    headers: BTreeMap<String, Vec<String>>,
    body: Vec<u8>,
}

impl HttpMessageAdapter for RawRequest {
    fn header_values(&self, name: &str) -> Option<Vec<String>> {
        self.headers.get(&name.to_ascii_lowercase()).cloned()
    }

    fn request_target(&self) -> Option<RequestTarget> {
        Some(RequestTarget {
            method: self.method.clone(),
            path: self.path.clone(),
        })
    }
}

fn parse_request(buf: &[u8]) -> RawRequest {
    let mut raw_headers = [httparse::EMPTY_HEADER; 64];
    let mut req = httparse::Request::new(&mut raw_headers);
    let bytes_parsed = req.parse(buf).expect("failed to parse request").unwrap();

    let mut headers: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for header in req.headers.iter() {
        if header.name.is_empty() {
            continue;
        }
        let value = std::str::from_utf8(header.value)
            .expect("header value is not valid UTF-8")
            .to_owned();
        headers
            .entry(header.name.to_ascii_lowercase())
            .or_default()
            .push(value);
    }

    RawRequest {
        method: req.method.expect("no method").to_owned(),
        path: req.path.expect("no path").to_owned(),
        headers,
        body: buf[bytes_parsed..].to_vec(),
    }
}

#[tokio::main]
async fn main() {
    // Values taken from:
    // https://tools.ietf.org/html/draft-cavage-http-signatures-12#appendix-C
    let input = br#"POST /foo?param=value&pet=dog HTTP/1.1
Host: example.com
Date: Sun, 05 Jan 2014 21:31:40 GMT
Content-Type: application/json
Content-Length: 18

{"hello": "world"}"#;

    let mut request = parse_request(input);

    let manager = KeyManager::from_key(
        httpsig::SUPPORTED_VERSION,
        "test",
        KeyConfig::Secret {
            mac_algorithm: MacAlgorithm::HmacSha256,
            key_material: b"a shared secret, known only to the two parties".to_vec(),
        },
        SignatureOptions::default(),
    )
    .expect("key manager configuration is valid");

    let key = manager
        .get_key("test", SignatureScheme::HmacSha256)
        .await
        .expect("key resolution failed");

    let digest_header = key.create_digest_header(&request.body);
    request
        .headers
        .entry("digest".to_owned())
        .or_default()
        .push(digest_header);

    let ctx = MessageContext::with_timestamps(
        &request,
        TimestampOptions {
            created: Some(1_388_964_700),
            expires: None,
        },
    );
    let signature_header = key.sign_request(&ctx).expect("signing failed");

    println!("Signature: {signature_header}");

    request
        .headers
        .entry("signature".to_owned())
        .or_default()
        .push(signature_header);

    let verify_ctx = MessageContext::new(&request);
    manager
        .verify_request(&verify_ctx, Some(1_388_964_730_000))
        .await
        .expect("verification failed");

    println!("Signature verified successfully.");
}
