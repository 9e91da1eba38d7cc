use std::sync::LazyLock;

use prometheus::*;

static METRIC_COLLECTION_COUNT: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!("dupfind_collection_count", "count of the created collections").unwrap()
});

static METRIC_COLLECTION_SIZE: LazyLock<Histogram> = LazyLock::new(|| {
    register_histogram!(
        "dupfind_collection_size",
        "number of images per created collection",
        exponential_buckets(2., 2., 12).unwrap()
    )
    .unwrap()
});

static METRIC_QUERY_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    register_histogram!("dupfind_query_duration", "duration of the duplicate query in seconds")
        .unwrap()
});

static METRIC_SKIPPED_IMAGE_COUNT: LazyLock<IntCounter> = LazyLock::new(|| {
    register_int_counter!("dupfind_skipped_image_count", "count of the skipped uploaded images")
        .unwrap()
});

/// 记录新建的集合及其图片数量
pub fn inc_collection_count(size: usize) {
    METRIC_COLLECTION_COUNT.inc();
    METRIC_COLLECTION_SIZE.observe(size as f64);
}

pub fn observe_query_duration(duration: f32) {
    METRIC_QUERY_DURATION.observe(duration as f64);
}

pub fn inc_skipped_image_count(n: usize) {
    METRIC_SKIPPED_IMAGE_COUNT.inc_by(n as u64);
}

/// 以文本格式导出所有指标
pub fn gather_text() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    Ok(encoder.encode_to_string(&prometheus::gather())?)
}
