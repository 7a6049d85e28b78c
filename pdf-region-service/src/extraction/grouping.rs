//! Partitioning of a batch's images by page.

use std::collections::BTreeMap;

use super::types::ImageSpec;

/// An image together with its position in the request
#[derive(Debug, Clone, Copy)]
pub struct PositionedImage<'a> {
    pub position: usize,
    pub spec: &'a ImageSpec,
}

/// All images that reference one page, in request order
#[derive(Debug, Clone)]
pub struct PageGroupEntry<'a> {
    pub page_index: u32,
    pub images: Vec<PositionedImage<'a>>,
}

/// Images of a batch grouped by page, pages in ascending index order.
#[derive(Debug, Clone)]
pub struct PageGroups<'a> {
    entries: Vec<PageGroupEntry<'a>>,
}

impl<'a> PageGroups<'a> {
    pub fn build(images: &'a [ImageSpec]) -> Self {
        let mut pages: BTreeMap<u32, Vec<PositionedImage<'a>>> = BTreeMap::new();
        for (position, spec) in images.iter().enumerate() {
            pages
                .entry(spec.page_index)
                .or_default()
                .push(PositionedImage { position, spec });
        }

        let entries = pages
            .into_iter()
            .map(|(page_index, images)| PageGroupEntry { page_index, images })
            .collect();

        Self { entries }
    }

    pub fn entries(&self) -> &[PageGroupEntry<'a>] {
        &self.entries
    }

    pub fn page_count(&self) -> usize {
        self.entries.len()
    }

    /// Input positions of every image on the pages from `start` onwards.
    pub fn positions_from(&self, start: usize) -> Vec<usize> {
        self.entries
            .iter()
            .skip(start)
            .flat_map(|entry| entry.images.iter().map(|image| image.position))
            .collect()
    }
}
