//! Reference glyphs and the density comparison used to match against them.

use std::collections::HashMap;
use std::path::Path;

use tracing::{info, warn};

use crate::error::TemplateError;
use crate::geometry::{binarize, ratio_of_pixels};
use crate::raster::Bitmap;

/// Maximum difference in foreground ratio for a match.
const RATIO_TOLERANCE: f64 = 0.2;

/// The seven reference shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Template {
    FilledNoteHead,
    Semibreve,
    Minim,
    Tail,
    CrotchetRest,
    QuaverRest,
    SemiquaverRest,
}

impl Template {
    pub const ALL: [Template; 7] = [
        Template::FilledNoteHead,
        Template::Semibreve,
        Template::Minim,
        Template::Tail,
        Template::CrotchetRest,
        Template::QuaverRest,
        Template::SemiquaverRest,
    ];

    /// Asset file name inside the template directory.
    pub fn file_name(self) -> &'static str {
        match self {
            Template::FilledNoteHead => "filledNoteHead.png",
            Template::Semibreve => "semibreve.jpg",
            Template::Minim => "minim.png",
            Template::Tail => "tail.png",
            Template::CrotchetRest => "crotchetRest.png",
            Template::QuaverRest => "quaverRest.png",
            Template::SemiquaverRest => "semiquaverRest.png",
        }
    }
}

/// Compare a symbol against a template by foreground density.
///
/// A symbol wider (relative to its height) than the template is first
/// cropped about its centre to the template's aspect ratio.
pub fn compare(template: &Bitmap, symbol: &Bitmap) -> bool {
    let (tw, th) = (template.width() as u64, template.height() as u64);
    let (sw, sh) = (symbol.width() as u64, symbol.height() as u64);
    if th == 0 || sh == 0 {
        return false;
    }
    let cropped;
    let symbol = if sw * th > tw * sh {
        let new_width = (tw * sh / th) as u32;
        let x = ((sw as u32 - new_width) / 2) as i32;
        cropped = symbol.crop(x, 0, new_width, sh as u32);
        &cropped
    } else {
        symbol
    };
    (ratio_of_pixels(template) - ratio_of_pixels(symbol)).abs() <= RATIO_TOLERANCE
}

fn load_template(dir: &Path, template: Template, threshold: u8) -> Result<Bitmap, TemplateError> {
    let path = dir.join(template.file_name());
    let image = image::open(&path).map_err(|e| TemplateError::Missing {
        name: template.file_name(),
        path: path.clone(),
        reason: e.to_string(),
    })?;
    Ok(binarize(&image, threshold))
}

/// The loaded reference glyphs.
///
/// An empty set never matches anything; recognition then simply skips every
/// template-dependent classification.
#[derive(Debug, Clone, Default)]
pub struct TrainingSet {
    templates: HashMap<Template, Bitmap>,
}

impl TrainingSet {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_templates(templates: impl IntoIterator<Item = (Template, Bitmap)>) -> Self {
        Self {
            templates: templates.into_iter().collect(),
        }
    }

    /// Load all seven glyphs from `dir`, failing on the first missing one.
    pub fn load(dir: &Path, threshold: u8) -> Result<Self, TemplateError> {
        let templates = Template::ALL
            .iter()
            .map(|&t| Ok((t, load_template(dir, t, threshold)?)))
            .collect::<Result<HashMap<_, _>, TemplateError>>()?;
        info!(dir = %dir.display(), "templates loaded");
        Ok(Self { templates })
    }

    /// Load whichever glyphs `dir` holds. A missing glyph is logged and
    /// only disables the matches made against it.
    pub fn load_available(dir: &Path, threshold: u8) -> Self {
        let mut templates = HashMap::new();
        for template in Template::ALL {
            match load_template(dir, template, threshold) {
                Ok(bitmap) => {
                    templates.insert(template, bitmap);
                }
                Err(e) => warn!("{e}; matching against it disabled"),
            }
        }
        info!(
            dir = %dir.display(),
            loaded = templates.len(),
            "templates loaded"
        );
        Self { templates }
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn matches(&self, template: Template, symbol: &Bitmap) -> bool {
        self.templates
            .get(&template)
            .map_or(false, |t| compare(t, symbol))
    }

    pub fn is_tail(&self, symbol: &Bitmap) -> bool {
        self.matches(Template::Tail, symbol)
    }

    pub fn is_crotchet_rest(&self, symbol: &Bitmap) -> bool {
        self.matches(Template::CrotchetRest, symbol)
    }

    pub fn is_quaver_rest(&self, symbol: &Bitmap) -> bool {
        self.matches(Template::QuaverRest, symbol)
    }

    pub fn is_semiquaver_rest(&self, symbol: &Bitmap) -> bool {
        self.matches(Template::SemiquaverRest, symbol)
    }
}
