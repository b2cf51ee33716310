//! Static photo gallery pages, one per site
//!
//! Every page lists the site's photos as thumbnails linking to the full
//! image in public storage: `{url_root}{folder}/{image}`.

use crate::error::StrataError;
use crate::utils::{read_csv, string_values};
use anyhow::{Context, Result};
use polars::prelude::DataFrame;
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// Photos grouped by site folder, folders in first-appearance order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhotoIndex {
    folders: Vec<(String, Vec<String>)>,
}

impl PhotoIndex {
    /// Add one photo; duplicates within a folder are ignored
    pub fn insert(&mut self, folder: &str, image: &str) {
        match self.folders.iter_mut().find(|entry| entry.0 == folder) {
            Some((_, images)) => {
                if !images.iter().any(|i| i == image) {
                    images.push(image.to_string());
                }
            }
            None => self.folders.push((folder.to_string(), vec![image.to_string()])),
        }
    }

    /// Build from a photo-list table (`folder_name`, `image_name` by default)
    pub fn from_frame(df: &DataFrame, folder_column: &str, image_column: &str) -> Result<Self> {
        let folders = string_values(df, folder_column, "photo list")?;
        let images = string_values(df, image_column, "photo list")?;

        let mut index = Self::default();
        for (folder, image) in (&folders).into_iter().zip(&images) {
            if let (Some(folder), Some(image)) = (folder, image) {
                index.insert(folder, image);
            }
        }
        Ok(index)
    }

    pub fn load(path: &Path, folder_column: &str, image_column: &str) -> Result<Self> {
        let df = read_csv(path)?;
        Self::from_frame(&df, folder_column, image_column)
    }

    /// Build from a photo tree: each immediate sub-folder of `root` is a site
    pub fn scan(root: &Path, extension: &str) -> Result<Self> {
        let extension = extension.trim_start_matches('.');
        let mut entries: Vec<(String, String)> = Vec::new();

        for entry in WalkDir::new(root).min_depth(2).max_depth(2) {
            let entry = entry.with_context(|| format!("Failed to walk {:?}", root))?;
            let path = entry.path();
            let matches_ext = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(extension));
            if !entry.file_type().is_file() || !matches_ext {
                continue;
            }

            let folder = path
                .parent()
                .and_then(|p| p.file_name())
                .and_then(|n| n.to_str());
            let image = path.file_name().and_then(|n| n.to_str());
            if let (Some(folder), Some(image)) = (folder, image) {
                entries.push((folder.to_string(), image.to_string()));
            }
        }

        entries.sort();
        let mut index = Self::default();
        for (folder, image) in &entries {
            index.insert(folder, image);
        }
        Ok(index)
    }

    pub fn folders(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.folders.iter().map(|(f, i)| (f.as_str(), i.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.folders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.folders.is_empty()
    }
}

/// Full URL for one photo; path segments are percent-encoded
pub fn photo_url(url_root: &str, folder: &str, image: &str) -> String {
    format!(
        "{}{}/{}",
        url_root,
        urlencoding::encode(folder),
        urlencoding::encode(image)
    )
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// HTML page for one site
pub fn render_page(folder: &str, images: &[String], url_root: &str) -> String {
    let title = format!("Site Visit Photos for {}", escape_html(folder));
    let mut html = String::with_capacity(1024 + images.len() * 256);

    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n");
    html.push_str("<meta charset=\"UTF-8\">\n");
    html.push_str("<link rel=\"stylesheet\" href=\"https://fonts.googleapis.com/css?family=Roboto\">\n");
    html.push_str(&format!("<title>{}</title>\n", title));
    html.push_str("</head>\n<body>\n");
    html.push_str(&format!(
        "<h1 style=\"text-align:center;font-family:'Roboto',sans-serif;font-weight:lighter;\">{}</h1>\n",
        title
    ));
    html.push_str("<div id=\"container\" style=\"display:flex;flex-direction:row;flex-wrap:wrap;justify-content:center;width:90%;margin:auto;\">\n");

    for image in images {
        let url = escape_html(&photo_url(url_root, folder, image));
        html.push_str(&format!(
            "\t<a href=\"{url}\" style=\"display:inline-block;margin:10px;\"><img src=\"{url}\" alt=\"{alt}\" style=\"width:300px;height:225px;object-fit:cover;object-position:25% 25%;\"></a>\n",
            url = url,
            alt = escape_html(image),
        ));
    }

    html.push_str("</div>\n</body>\n</html>\n");
    html
}

/// Page file name for a site folder; the folder must be a single plain path component
fn page_name(folder: &str) -> Result<String> {
    let plain = !folder.is_empty()
        && folder != "."
        && !folder.contains(['/', '\\'])
        && !folder.contains("..");
    if !plain {
        return Err(StrataError::InvalidConfig(format!("unusable site folder name {:?}", folder)).into());
    }
    Ok(format!("{}.html", folder))
}

/// Write `{folder}.html` for every site, replacing existing pages
///
/// Every folder name is checked before the first page is written.
/// Returns the number of pages written.
pub fn write_gallery(index: &PhotoIndex, url_root: &str, output_dir: &Path) -> Result<usize> {
    let pages = index
        .folders()
        .map(|(folder, images)| -> Result<_> { Ok((page_name(folder)?, folder, images)) })
        .collect::<Result<Vec<_>>>()?;

    fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create gallery folder: {:?}", output_dir))?;

    let mut written = 0usize;
    for (file_name, folder, images) in pages {
        let page = output_dir.join(file_name);
        fs::write(&page, render_page(folder, images, url_root))
            .with_context(|| format!("Failed to write {:?}", page))?;
        tracing::debug!(photos = images.len(), "wrote {:?}", page);
        written += 1;
    }

    tracing::info!(pages = written, "gallery pages written to {:?}", output_dir);
    Ok(written)
}
