//! One outcome per requested image, assembled into the response.

use tracing::warn;

use crate::config::ResultOrder;
use crate::error::{ServiceError, ServiceResult};

use super::types::{EncodedCrop, ExtractionResponse, ExtractionResult, FailureCode, ImageSpec};

pub struct ResultAggregator<'a> {
    images: &'a [ImageSpec],
    /// Input positions in page-grouped order
    grouped_order: Vec<usize>,
    slots: Vec<Option<ExtractionResult>>,
}

impl<'a> ResultAggregator<'a> {
    pub fn new(images: &'a [ImageSpec], grouped_order: Vec<usize>) -> Self {
        Self {
            images,
            grouped_order,
            slots: vec![None; images.len()],
        }
    }

    pub fn is_resolved(&self, position: usize) -> bool {
        self.slots.get(position).is_some_and(Option::is_some)
    }

    fn record(&mut self, position: usize, result: ExtractionResult) {
        let Some(slot) = self.slots.get_mut(position) else {
            warn!(position = position, "Result for unknown image position");
            return;
        };
        if let Some(existing) = slot.as_ref() {
            warn!(
                position = position,
                image_id = %existing.image_id(),
                "Image already has a result, keeping the first"
            );
            return;
        }
        *slot = Some(result);
    }

    pub fn record_success(&mut self, position: usize, crop: EncodedCrop) {
        let Some(image) = self.images.get(position) else {
            warn!(position = position, "Result for unknown image position");
            return;
        };
        let result = ExtractionResult::Success {
            image_id: image.image_id.clone(),
            crop,
        };
        self.record(position, result);
    }

    pub fn record_failure(&mut self, position: usize, code: FailureCode, message: impl Into<String>) {
        let Some(image) = self.images.get(position) else {
            warn!(position = position, "Result for unknown image position");
            return;
        };
        let result = ExtractionResult::Failed {
            image_id: image.image_id.clone(),
            code,
            message: message.into(),
        };
        self.record(position, result);
    }

    /// Fail every listed position that has no result yet. Returns how many
    /// were newly failed.
    pub fn fail_remaining(
        &mut self,
        positions: impl IntoIterator<Item = usize>,
        code: FailureCode,
        message: &str,
    ) -> usize {
        let mut failed = 0;
        for position in positions {
            if position < self.slots.len() && !self.is_resolved(position) {
                self.record_failure(position, code, message);
                failed += 1;
            }
        }
        failed
    }

    /// Assemble the response, failing if any image was left without a result.
    pub fn finish(
        self,
        request_id: impl Into<String>,
        order: ResultOrder,
    ) -> ServiceResult<ExtractionResponse> {
        let total = self.slots.len();
        let order: Vec<usize> = match order {
            ResultOrder::PageGrouped if self.grouped_order.len() == total => self.grouped_order,
            ResultOrder::PageGrouped | ResultOrder::Input => (0..total).collect(),
        };

        let mut slots = self.slots;
        let mut results = Vec::with_capacity(total);
        for position in order {
            let result = slots.get_mut(position).and_then(Option::take).ok_or_else(|| {
                ServiceError::internal(format!(
                    "No result recorded for image at position {}",
                    position
                ))
            })?;
            results.push(result);
        }

        Ok(ExtractionResponse {
            request_id: request_id.into(),
            results,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn specs(ids: &[(&str, u32)]) -> Vec<ImageSpec> {
        ids.iter()
            .map(|(id, page)| ImageSpec {
                image_id: id.to_string(),
                placeholder_id: None,
                page_index: *page,
                coordinates: [0.0, 0.0, 10.0, 10.0],
            })
            .collect()
    }

    fn crop() -> EncodedCrop {
        EncodedCrop {
            width: 1,
            height: 1,
            bytes: vec![1, 2, 3],
        }
    }

    #[test]
    fn test_fail_remaining_skips_resolved() {
        let images = specs(&[("a", 0), ("b", 0), ("c", 1)]);
        let mut aggregator = ResultAggregator::new(&images, vec![0, 1, 2]);
        aggregator.record_success(0, crop());

        let failed = aggregator.fail_remaining(0..3, FailureCode::DeadlineExceeded, "late");
        assert_eq!(failed, 2);

        let response = aggregator.finish("req", ResultOrder::Input).unwrap();
        assert!(response.results[0].is_success());
        assert_eq!(
            response.results[1].failure_code(),
            Some(FailureCode::DeadlineExceeded)
        );
        assert_eq!(
            response.results[2].failure_code(),
            Some(FailureCode::DeadlineExceeded)
        );
    }

    #[test]
    fn test_first_result_wins() {
        let images = specs(&[("a", 0)]);
        let mut aggregator = ResultAggregator::new(&images, vec![0]);
        aggregator.record_failure(0, FailureCode::CropTooLarge, "too big");
        aggregator.record_success(0, crop());

        let response = aggregator.finish("req", ResultOrder::PageGrouped).unwrap();
        assert_eq!(response.results.len(), 1);
        assert_eq!(
            response.results[0].failure_code(),
            Some(FailureCode::CropTooLarge)
        );
    }

    #[test]
    fn test_finish_rejects_missing_result() {
        let images = specs(&[("a", 0), ("b", 0)]);
        let mut aggregator = ResultAggregator::new(&images, vec![0, 1]);
        aggregator.record_success(0, crop());

        let err = aggregator.finish("req", ResultOrder::Input).unwrap_err();
        assert!(matches!(err, ServiceError::Internal { .. }));
    }

    #[test]
    fn test_page_grouped_and_input_order() {
        let images = specs(&[("a", 2), ("b", 0), ("c", 2)]);
        let grouped = vec![1, 0, 2];

        let mut aggregator = ResultAggregator::new(&images, grouped.clone());
        aggregator.fail_remaining(0..3, FailureCode::PageRenderFailed, "bad");
        let response = aggregator.finish("req", ResultOrder::PageGrouped).unwrap();
        let ids: Vec<&str> = response.results.iter().map(|r| r.image_id()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);

        let mut aggregator = ResultAggregator::new(&images, grouped);
        aggregator.fail_remaining(0..3, FailureCode::PageRenderFailed, "bad");
        let response = aggregator.finish("req", ResultOrder::Input).unwrap();
        let ids: Vec<&str> = response.results.iter().map(|r| r.image_id()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(response.request_id, "req");
    }

    #[test]
    fn test_duplicate_image_ids_keep_separate_slots() {
        let images = specs(&[("same", 0), ("same", 0)]);
        let mut aggregator = ResultAggregator::new(&images, vec![0, 1]);
        aggregator.record_success(0, crop());
        aggregator.record_failure(1, FailureCode::CropConversionFailed, "degenerate");
        assert!(aggregator.is_resolved(0) && aggregator.is_resolved(1));

        let response = aggregator.finish("req", ResultOrder::PageGrouped).unwrap();
        assert_eq!(response.results.len(), 2);
    }
}
