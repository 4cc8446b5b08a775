use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use roxmltree::{Document, Node};

use crate::app::Vec2;
use crate::AppPaths;

use super::database::{
    ArenaStageDef, BossDef, BossDefId, CompletionBehavior, DefDatabase, EncounterDef,
    EncounterDefId, ScriptEntry, ShopDef, ARENA_STAGE_COUNT,
};
use super::discovery::discover_mod_sources;
use super::types::{ContentPlanError, ContentPlanRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentErrorCode {
    Discovery,
    ReadFile,
    XmlMalformed,
    InvalidRoot,
    UnknownDefType,
    UnknownField,
    DuplicateField,
    MissingField,
    InvalidValue,
    DuplicateDefInMod,
}

#[derive(Debug, Clone)]
pub struct ContentCompileError {
    pub code: ContentErrorCode,
    pub message: String,
    pub mod_id: String,
    pub file_path: PathBuf,
    pub location: Option<SourceLocation>,
}

impl fmt::Display for ContentCompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location {
            Some(loc) => write!(
                f,
                "{:?}: {} (mod={}, file={}, line={}, column={})",
                self.code,
                self.message,
                self.mod_id,
                self.file_path.display(),
                loc.line,
                loc.column
            ),
            None => write!(
                f,
                "{:?}: {} (mod={}, file={})",
                self.code,
                self.message,
                self.mod_id,
                self.file_path.display()
            ),
        }
    }
}

impl std::error::Error for ContentCompileError {}

#[derive(Debug, Clone)]
enum ParsedDef {
    Encounter(EncounterDef),
    Boss(BossDef),
    ArenaStage(ArenaStageDef),
    Shop(ShopDef),
    Script(Vec<ScriptEntry>),
}

impl ParsedDef {
    /// Identity used for same-mod duplicate detection and cross-mod override.
    fn merge_key(&self) -> String {
        match self {
            Self::Encounter(def) => format!("EncounterDef:{}", def.def_name),
            Self::Boss(def) => format!("BossDef:{}", def.def_name),
            Self::ArenaStage(def) => format!("ArenaStageDef:{}", def.stage),
            Self::Shop(_) => "ShopDef".to_string(),
            Self::Script(_) => "StoryScript".to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct MergedDefs {
    encounters: BTreeMap<String, EncounterDef>,
    bosses: BTreeMap<String, BossDef>,
    arena_stages: BTreeMap<u8, ArenaStageDef>,
    shop: Option<ShopDef>,
    script: Option<Vec<ScriptEntry>>,
}

impl MergedDefs {
    // Cross-mod duplicates are intentional override points (last mod wins).
    fn insert(&mut self, def: ParsedDef) {
        match def {
            ParsedDef::Encounter(def) => {
                self.encounters.insert(def.def_name.clone(), def);
            }
            ParsedDef::Boss(def) => {
                self.bosses.insert(def.def_name.clone(), def);
            }
            ParsedDef::ArenaStage(def) => {
                self.arena_stages.insert(def.stage, def);
            }
            ParsedDef::Shop(def) => self.shop = Some(def),
            ParsedDef::Script(entries) => self.script = Some(entries),
        }
    }

    fn into_database(self) -> DefDatabase {
        DefDatabase::new(
            self.encounters.into_values().collect(),
            self.bosses.into_values().collect(),
            self.arena_stages.into_values().collect(),
            self.shop,
            self.script.unwrap_or_default(),
        )
    }
}

pub fn compile_def_database(
    app_paths: &AppPaths,
    request: &ContentPlanRequest,
) -> Result<DefDatabase, ContentCompileError> {
    let sources = discover_mod_sources(app_paths, request)
        .map_err(|error| map_discovery_error(error, &app_paths.root))?;

    let mut merged = MergedDefs::default();

    for source in sources {
        let xml_files = collect_xml_files_sorted(&source.source_dir)
            .map_err(|error| read_error(&source.mod_id, error.path, error.source))?;
        let mut seen_in_mod = HashSet::<String>::new();

        for xml_file in xml_files {
            let raw = fs::read_to_string(&xml_file)
                .map_err(|source_err| read_error(&source.mod_id, xml_file.clone(), source_err))?;
            let defs = parse_defs_document(&source.mod_id, &xml_file, &raw)?;
            for def in defs {
                let key = def.merge_key();
                if !seen_in_mod.insert(key.clone()) {
                    return Err(ContentCompileError {
                        code: ContentErrorCode::DuplicateDefInMod,
                        message: format!(
                            "duplicate {key} in mod '{}'; each mod may define it only once",
                            source.mod_id
                        ),
                        mod_id: source.mod_id.clone(),
                        file_path: xml_file.clone(),
                        location: None,
                    });
                }
                merged.insert(def);
            }
        }
    }

    Ok(merged.into_database())
}

struct ParseContext<'a, 'input> {
    mod_id: &'a str,
    file_path: &'a Path,
    doc: &'a Document<'input>,
}

impl<'a, 'input> ParseContext<'a, 'input> {
    fn error_at(
        &self,
        code: ContentErrorCode,
        message: String,
        node: Node<'_, '_>,
    ) -> ContentCompileError {
        let pos = self.doc.text_pos_at(node.range().start);
        ContentCompileError {
            code,
            message,
            mod_id: self.mod_id.to_string(),
            file_path: self.file_path.to_path_buf(),
            location: Some(SourceLocation {
                line: pos.row as usize,
                column: pos.col as usize,
            }),
        }
    }
}

fn parse_defs_document(
    mod_id: &str,
    file_path: &Path,
    raw: &str,
) -> Result<Vec<ParsedDef>, ContentCompileError> {
    let doc = Document::parse(raw).map_err(|error| ContentCompileError {
        code: ContentErrorCode::XmlMalformed,
        message: format!("malformed XML: {error}"),
        mod_id: mod_id.to_string(),
        file_path: file_path.to_path_buf(),
        location: Some(SourceLocation {
            line: error.pos().row as usize,
            column: error.pos().col as usize,
        }),
    })?;
    let ctx = ParseContext {
        mod_id,
        file_path,
        doc: &doc,
    };

    let root = doc.root_element();
    if root.tag_name().name() != "Defs" {
        return Err(ctx.error_at(
            ContentErrorCode::InvalidRoot,
            "root element must be <Defs>".to_string(),
            root,
        ));
    }

    let mut defs = Vec::<ParsedDef>::new();
    for child in root.children().filter(|node| node.is_element()) {
        let parsed = match child.tag_name().name() {
            "EncounterDef" => ParsedDef::Encounter(parse_encounter_def(&ctx, child)?),
            "BossDef" => ParsedDef::Boss(parse_boss_def(&ctx, child)?),
            "ArenaStageDef" => ParsedDef::ArenaStage(parse_arena_stage_def(&ctx, child)?),
            "ShopDef" => ParsedDef::Shop(parse_shop_def(&ctx, child)?),
            "StoryScript" => ParsedDef::Script(parse_story_script(&ctx, child)?),
            other => {
                return Err(ctx.error_at(
                    ContentErrorCode::UnknownDefType,
                    format!(
                        "unsupported def type <{other}>; expected EncounterDef, BossDef, \
ArenaStageDef, ShopDef or StoryScript"
                    ),
                    child,
                ))
            }
        };
        defs.push(parsed);
    }

    Ok(defs)
}

/// Child elements of one def, checked against the allowed field names.
struct DefFields<'a, 'input> {
    def_type: &'static str,
    owner: Node<'a, 'input>,
    single: HashMap<&'static str, Node<'a, 'input>>,
    repeated: HashMap<&'static str, Vec<Node<'a, 'input>>>,
}

impl<'a, 'input> DefFields<'a, 'input> {
    fn collect(
        ctx: &ParseContext<'_, '_>,
        def_type: &'static str,
        owner: Node<'a, 'input>,
        allowed: &[&'static str],
        repeatable: &[&'static str],
    ) -> Result<Self, ContentCompileError> {
        let mut single = HashMap::new();
        let mut repeated = HashMap::<&'static str, Vec<Node<'a, 'input>>>::new();
        for field in owner.children().filter(|child| child.is_element()) {
            let name = field.tag_name().name();
            if let Some(key) = repeatable.iter().copied().find(|key| *key == name) {
                repeated.entry(key).or_default().push(field);
                continue;
            }
            let Some(key) = allowed.iter().copied().find(|key| *key == name) else {
                return Err(ctx.error_at(
                    ContentErrorCode::UnknownField,
                    format!("unknown field <{name}> in <{def_type}>"),
                    field,
                ));
            };
            if single.insert(key, field).is_some() {
                return Err(ctx.error_at(
                    ContentErrorCode::DuplicateField,
                    format!("duplicate field <{name}> in <{def_type}>"),
                    field,
                ));
            }
        }
        Ok(Self {
            def_type,
            owner,
            single,
            repeated,
        })
    }

    fn required_text(
        &self,
        ctx: &ParseContext<'_, '_>,
        field_name: &'static str,
    ) -> Result<String, ContentCompileError> {
        match self.optional_text(ctx, field_name)? {
            Some(value) => Ok(value),
            None => Err(ctx.error_at(
                ContentErrorCode::MissingField,
                format!(
                    "missing required field <{field_name}> in <{}>",
                    self.def_type
                ),
                self.owner,
            )),
        }
    }

    fn optional_text(
        &self,
        ctx: &ParseContext<'_, '_>,
        field_name: &'static str,
    ) -> Result<Option<String>, ContentCompileError> {
        self.single
            .get(field_name)
            .map(|node| non_empty_text(ctx, *node, field_name))
            .transpose()
    }

    fn repeated_text(
        &self,
        ctx: &ParseContext<'_, '_>,
        field_name: &'static str,
    ) -> Result<Vec<String>, ContentCompileError> {
        self.repeated
            .get(field_name)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .map(|node| non_empty_text(ctx, *node, field_name))
            .collect()
    }

    fn node(&self, field_name: &'static str) -> Node<'a, 'input> {
        self.single.get(field_name).copied().unwrap_or(self.owner)
    }

    fn optional_f32(
        &self,
        ctx: &ParseContext<'_, '_>,
        field_name: &'static str,
        min_exclusive: f32,
    ) -> Result<Option<f32>, ContentCompileError> {
        let Some(value) = self.optional_text(ctx, field_name)? else {
            return Ok(None);
        };
        let parsed = value.parse::<f32>().map_err(|_| {
            ctx.error_at(
                ContentErrorCode::InvalidValue,
                format!("{field_name} '{value}' is not a valid number"),
                self.node(field_name),
            )
        })?;
        if !parsed.is_finite() || parsed <= min_exclusive {
            return Err(ctx.error_at(
                ContentErrorCode::InvalidValue,
                format!("{field_name} must be finite and > {min_exclusive}"),
                self.node(field_name),
            ));
        }
        Ok(Some(parsed))
    }

    fn optional_u32(
        &self,
        ctx: &ParseContext<'_, '_>,
        field_name: &'static str,
    ) -> Result<Option<u32>, ContentCompileError> {
        let Some(value) = self.optional_text(ctx, field_name)? else {
            return Ok(None);
        };
        value.parse::<u32>().map(Some).map_err(|_| {
            ctx.error_at(
                ContentErrorCode::InvalidValue,
                format!("{field_name} '{value}' is not a non-negative integer"),
                self.node(field_name),
            )
        })
    }

    fn required_u32(
        &self,
        ctx: &ParseContext<'_, '_>,
        field_name: &'static str,
    ) -> Result<u32, ContentCompileError> {
        self.required_text(ctx, field_name)?;
        self.optional_u32(ctx, field_name)
            .map(|value| value.unwrap_or_default())
    }

    fn optional_scale(
        &self,
        ctx: &ParseContext<'_, '_>,
    ) -> Result<Option<Vec2>, ContentCompileError> {
        let Some(value) = self.optional_text(ctx, "scale")? else {
            return Ok(None);
        };
        let invalid = || {
            ctx.error_at(
                ContentErrorCode::InvalidValue,
                format!("scale '{value}' must be two positive numbers written as \"x,y\""),
                self.node("scale"),
            )
        };
        let (raw_x, raw_y) = value.split_once(',').ok_or_else(invalid)?;
        let x = raw_x.trim().parse::<f32>().map_err(|_| invalid())?;
        let y = raw_y.trim().parse::<f32>().map_err(|_| invalid())?;
        if !(x.is_finite() && y.is_finite() && x > 0.0 && y > 0.0) {
            return Err(invalid());
        }
        Ok(Some(Vec2 { x, y }))
    }
}

fn non_empty_text(
    ctx: &ParseContext<'_, '_>,
    node: Node<'_, '_>,
    field_name: &str,
) -> Result<String, ContentCompileError> {
    let value = node.text().map(str::trim).unwrap_or_default().to_string();
    if value.is_empty() {
        return Err(ctx.error_at(
            ContentErrorCode::MissingField,
            format!("field <{field_name}> must not be empty"),
            node,
        ));
    }
    Ok(value)
}

fn parse_encounter_def(
    ctx: &ParseContext<'_, '_>,
    node: Node<'_, '_>,
) -> Result<EncounterDef, ContentCompileError> {
    let fields = DefFields::collect(
        ctx,
        "EncounterDef",
        node,
        &[
            "defName",
            "label",
            "scale",
            "guardKind",
            "guardCount",
            "guardHealthMult",
            "cameraZoom",
            "reward",
            "rewardText",
            "completion",
            "npc",
            "followUpBoss",
            "spawnText",
            "completionText",
        ],
        &[],
    )?;

    let def_name = fields.required_text(ctx, "defName")?;
    let npc = fields.optional_text(ctx, "npc")?;
    let follow_up_boss = fields.optional_text(ctx, "followUpBoss")?;
    let completion = match fields.required_text(ctx, "completion")?.as_str() {
        "npc" => {
            if follow_up_boss.is_some() {
                return Err(ctx.error_at(
                    ContentErrorCode::InvalidValue,
                    "followUpBoss is only allowed with completion 'structure'".to_string(),
                    fields.node("followUpBoss"),
                ));
            }
            let Some(npc_label) = npc else {
                return Err(ctx.error_at(
                    ContentErrorCode::MissingField,
                    "completion 'npc' requires an <npc> field".to_string(),
                    node,
                ));
            };
            CompletionBehavior::SpawnNpc { npc_label }
        }
        "structure" => {
            if npc.is_some() {
                return Err(ctx.error_at(
                    ContentErrorCode::InvalidValue,
                    "<npc> is only allowed with completion 'npc'".to_string(),
                    fields.node("npc"),
                ));
            }
            CompletionBehavior::InteractWithStructure { follow_up_boss }
        }
        other => {
            return Err(ctx.error_at(
                ContentErrorCode::InvalidValue,
                format!("invalid completion '{other}'; allowed values: npc, structure"),
                fields.node("completion"),
            ))
        }
    };

    Ok(EncounterDef {
        id: EncounterDefId(0),
        label: fields
            .optional_text(ctx, "label")?
            .unwrap_or_else(|| def_name.clone()),
        scale: fields.optional_scale(ctx)?.unwrap_or(Vec2 { x: 6.0, y: 8.0 }),
        guard_kind: fields.required_text(ctx, "guardKind")?,
        guard_count: fields.required_u32(ctx, "guardCount")?,
        guard_health_mult: fields.optional_f32(ctx, "guardHealthMult", 0.0)?.unwrap_or(1.0),
        camera_zoom: fields.optional_f32(ctx, "cameraZoom", 0.0)?.unwrap_or(1.0),
        reward: fields.required_text(ctx, "reward")?,
        reward_text: fields.required_text(ctx, "rewardText")?,
        completion,
        spawn_text: fields.optional_text(ctx, "spawnText")?.unwrap_or_default(),
        completion_text: fields
            .optional_text(ctx, "completionText")?
            .unwrap_or_default(),
        def_name,
    })
}

fn parse_boss_def(
    ctx: &ParseContext<'_, '_>,
    node: Node<'_, '_>,
) -> Result<BossDef, ContentCompileError> {
    let fields = DefFields::collect(
        ctx,
        "BossDef",
        node,
        &["defName", "label", "scale", "cameraZoom"],
        &[],
    )?;
    let def_name = fields.required_text(ctx, "defName")?;
    Ok(BossDef {
        id: BossDefId(0),
        label: fields
            .optional_text(ctx, "label")?
            .unwrap_or_else(|| def_name.clone()),
        scale: fields.optional_scale(ctx)?.unwrap_or(Vec2 { x: 8.0, y: 12.0 }),
        camera_zoom: fields.optional_f32(ctx, "cameraZoom", 0.0)?.unwrap_or(1.8),
        def_name,
    })
}

fn parse_arena_stage_def(
    ctx: &ParseContext<'_, '_>,
    node: Node<'_, '_>,
) -> Result<ArenaStageDef, ContentCompileError> {
    let fields = DefFields::collect(
        ctx,
        "ArenaStageDef",
        node,
        &[
            "stage",
            "label",
            "hostileKind",
            "hostileCount",
            "reward",
            "rewardText",
            "introText",
        ],
        &[],
    )?;
    let stage = fields.required_u32(ctx, "stage")?;
    if stage as usize >= ARENA_STAGE_COUNT {
        return Err(ctx.error_at(
            ContentErrorCode::InvalidValue,
            format!(
                "stage {stage} out of range; allowed values: 0..={}",
                ARENA_STAGE_COUNT - 1
            ),
            fields.node("stage"),
        ));
    }
    let hostile_count = fields.required_u32(ctx, "hostileCount")?;
    if hostile_count == 0 {
        return Err(ctx.error_at(
            ContentErrorCode::InvalidValue,
            "hostileCount must be at least 1".to_string(),
            fields.node("hostileCount"),
        ));
    }
    Ok(ArenaStageDef {
        stage: stage as u8,
        label: fields.required_text(ctx, "label")?,
        hostile_kind: fields.required_text(ctx, "hostileKind")?,
        hostile_count,
        reward: fields.required_text(ctx, "reward")?,
        reward_text: fields.required_text(ctx, "rewardText")?,
        intro_text: fields.optional_text(ctx, "introText")?.unwrap_or_default(),
    })
}

fn parse_shop_def(
    ctx: &ParseContext<'_, '_>,
    node: Node<'_, '_>,
) -> Result<ShopDef, ContentCompileError> {
    let fields = DefFields::collect(
        ctx,
        "ShopDef",
        node,
        &["guardKind", "guardCount"],
        &["appearText", "greetingText", "farewellText"],
    )?;
    Ok(ShopDef {
        guard_kind: fields.required_text(ctx, "guardKind")?,
        guard_count: fields.optional_u32(ctx, "guardCount")?.unwrap_or(5),
        appear_text: fields.repeated_text(ctx, "appearText")?,
        greeting_text: fields.repeated_text(ctx, "greetingText")?,
        farewell_text: fields.repeated_text(ctx, "farewellText")?,
    })
}

fn parse_story_script(
    ctx: &ParseContext<'_, '_>,
    node: Node<'_, '_>,
) -> Result<Vec<ScriptEntry>, ContentCompileError> {
    let mut entries = Vec::<ScriptEntry>::new();
    for child in node.children().filter(|child| child.is_element()) {
        if child.tag_name().name() != "entry" {
            return Err(ctx.error_at(
                ContentErrorCode::UnknownField,
                format!(
                    "unknown element <{}> in <StoryScript>; expected <entry>",
                    child.tag_name().name()
                ),
                child,
            ));
        }
        if matches!(entries.last(), Some(ScriptEntry::StoryComplete)) {
            return Err(ctx.error_at(
                ContentErrorCode::InvalidValue,
                "storyComplete must be the last script entry".to_string(),
                child,
            ));
        }
        let Some(kind) = child.attribute("kind") else {
            return Err(ctx.error_at(
                ContentErrorCode::MissingField,
                "script <entry> requires a kind attribute".to_string(),
                child,
            ));
        };
        let name = child.text().map(str::trim).unwrap_or_default().to_string();
        let entry = match kind {
            "encounter" | "boss" => {
                if name.is_empty() {
                    return Err(ctx.error_at(
                        ContentErrorCode::MissingField,
                        format!("script entry of kind '{kind}' must name a template"),
                        child,
                    ));
                }
                if kind == "encounter" {
                    ScriptEntry::Encounter(name)
                } else {
                    ScriptEntry::Boss(name)
                }
            }
            "portal" | "shop" | "storyComplete" => {
                if !name.is_empty() {
                    return Err(ctx.error_at(
                        ContentErrorCode::InvalidValue,
                        format!("script entry of kind '{kind}' takes no template name"),
                        child,
                    ));
                }
                match kind {
                    "portal" => ScriptEntry::Portal,
                    "shop" => ScriptEntry::Shop,
                    _ => ScriptEntry::StoryComplete,
                }
            }
            other => {
                return Err(ctx.error_at(
                    ContentErrorCode::InvalidValue,
                    format!(
                        "invalid script entry kind '{other}'; allowed values: encounter, boss, \
portal, shop, storyComplete"
                    ),
                    child,
                ))
            }
        };
        entries.push(entry);
    }
    Ok(entries)
}

struct ReadError {
    path: PathBuf,
    source: std::io::Error,
}

fn collect_xml_files_sorted(root: &Path) -> Result<Vec<PathBuf>, ReadError> {
    let mut files = Vec::<PathBuf>::new();
    collect_recursive(root, &mut files)?;
    files.sort_by_key(|path| normalize_rel_path(path.strip_prefix(root).unwrap_or(path)));
    Ok(files)
}

fn collect_recursive(current: &Path, files: &mut Vec<PathBuf>) -> Result<(), ReadError> {
    let entries = fs::read_dir(current).map_err(|source| ReadError {
        path: current.to_path_buf(),
        source,
    })?;
    for entry in entries {
        let entry = entry.map_err(|source| ReadError {
            path: current.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_dir() {
            collect_recursive(&path, files)?;
        } else if path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"))
        {
            files.push(path);
        }
    }
    Ok(())
}

fn normalize_rel_path(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}

fn read_error(mod_id: &str, path: PathBuf, source: std::io::Error) -> ContentCompileError {
    ContentCompileError {
        code: ContentErrorCode::ReadFile,
        message: format!("failed to read XML file: {source}"),
        mod_id: mod_id.to_string(),
        file_path: path,
        location: None,
    }
}

fn map_discovery_error(error: ContentPlanError, root: &Path) -> ContentCompileError {
    match error {
        ContentPlanError::EnabledModMissing {
            mod_id,
            expected_dir,
        } => ContentCompileError {
            code: ContentErrorCode::Discovery,
            message: format!(
                "enabled mod '{}' not found at {}; check enabled mod list",
                mod_id,
                expected_dir.display()
            ),
            mod_id,
            file_path: expected_dir,
            location: None,
        },
        other => ContentCompileError {
            code: ContentErrorCode::Discovery,
            message: other.to_string(),
            mod_id: "<discovery>".to_string(),
            file_path: root.to_path_buf(),
            location: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    const SWORD_DEF: &str = r#"<EncounterDef>
        <defName>swordInStone</defName>
        <label>Sword in the Stone</label>
        <scale>6,8</scale>
        <guardKind>goblin</guardKind>
        <guardCount>20</guardCount>
        <cameraZoom>2.2</cameraZoom>
        <reward>swords</reward>
        <rewardText>SWORD ADDED!</rewardText>
        <completion>structure</completion>
        <followUpBoss>troll</followUpBoss>
    </EncounterDef>"#;

    fn setup_app_paths(root: &Path) -> AppPaths {
        let paths = AppPaths::from_root(root.to_path_buf());
        fs::create_dir_all(&paths.base_content_dir).expect("base");
        fs::create_dir_all(&paths.mods_dir).expect("mods");
        paths
    }

    fn write_file(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        fs::write(path, content).expect("write");
    }

    fn compile_base(defs_body: &str) -> Result<DefDatabase, ContentCompileError> {
        let temp = TempDir::new().expect("temp");
        let app = setup_app_paths(temp.path());
        write_file(
            &app.base_content_dir.join("defs.xml"),
            &format!("<Defs>{defs_body}</Defs>"),
        );
        compile_def_database(&app, &ContentPlanRequest::default())
    }

    #[test]
    fn encounter_def_compiles_with_structure_completion() {
        let db = compile_base(SWORD_DEF).expect("compile");
        let id = db.encounter_id_by_name("swordInStone").expect("id");
        let def = db.encounter(id).expect("def");
        assert_eq!(def.guard_count, 20);
        assert_eq!(def.scale, Vec2 { x: 6.0, y: 8.0 });
        assert!((def.guard_health_mult - 1.0).abs() < f32::EPSILON);
        assert_eq!(
            def.completion,
            CompletionBehavior::InteractWithStructure {
                follow_up_boss: Some("troll".to_string())
            }
        );
    }

    #[test]
    fn npc_completion_requires_npc_field() {
        let err = compile_base(
            r#"<EncounterDef><defName>princessTower</defName><guardKind>goldenSkeleton</guardKind>
            <guardCount>15</guardCount><reward>magnet</reward><rewardText>MAGNET</rewardText>
            <completion>npc</completion></EncounterDef>"#,
        )
        .expect_err("err");
        assert_eq!(err.code, ContentErrorCode::MissingField);
        assert!(err.location.is_some());
    }

    #[test]
    fn zero_guard_encounter_is_allowed() {
        let db = compile_base(
            r#"<EncounterDef><defName>emptyShrine</defName><guardKind>none</guardKind>
            <guardCount>0</guardCount><reward>boom</reward><rewardText>BOOM</rewardText>
            <completion>structure</completion></EncounterDef>"#,
        )
        .expect("compile");
        let id = db.encounter_id_by_name("emptyShrine").expect("id");
        assert_eq!(db.encounter(id).expect("def").guard_count, 0);
    }

    #[test]
    fn unknown_field_errors() {
        let err = compile_base(
            r#"<BossDef><defName>troll</defName><mood>Grumpy</mood></BossDef>"#,
        )
        .expect_err("err");
        assert_eq!(err.code, ContentErrorCode::UnknownField);
    }

    #[test]
    fn duplicate_field_errors() {
        let err = compile_base(
            r#"<BossDef><defName>troll</defName><label>A</label><label>B</label></BossDef>"#,
        )
        .expect_err("err");
        assert_eq!(err.code, ContentErrorCode::DuplicateField);
    }

    #[test]
    fn invalid_scale_errors() {
        let err = compile_base(
            r#"<BossDef><defName>troll</defName><scale>8;12</scale></BossDef>"#,
        )
        .expect_err("err");
        assert_eq!(err.code, ContentErrorCode::InvalidValue);
    }

    #[test]
    fn arena_stage_out_of_range_errors() {
        let err = compile_base(
            r#"<ArenaStageDef><stage>3</stage><label>Beyond</label><hostileKind>wisp</hostileKind>
            <hostileCount>4</hostileCount><reward>magnet</reward><rewardText>X</rewardText></ArenaStageDef>"#,
        )
        .expect_err("err");
        assert_eq!(err.code, ContentErrorCode::InvalidValue);
    }

    #[test]
    fn story_script_preserves_order() {
        let db = compile_base(
            r#"<StoryScript>
                <entry kind="encounter">swordInStone</entry>
                <entry kind="boss">troll</entry>
                <entry kind="shop"/>
                <entry kind="portal"/>
                <entry kind="storyComplete"/>
            </StoryScript>"#,
        )
        .expect("compile");
        assert_eq!(
            db.script(),
            &[
                ScriptEntry::Encounter("swordInStone".to_string()),
                ScriptEntry::Boss("troll".to_string()),
                ScriptEntry::Shop,
                ScriptEntry::Portal,
                ScriptEntry::StoryComplete,
            ]
        );
    }

    #[test]
    fn story_complete_must_be_last() {
        let err = compile_base(
            r#"<StoryScript><entry kind="storyComplete"/><entry kind="shop"/></StoryScript>"#,
        )
        .expect_err("err");
        assert_eq!(err.code, ContentErrorCode::InvalidValue);
    }

    #[test]
    fn script_entry_without_template_name_errors() {
        let err = compile_base(r#"<StoryScript><entry kind="boss"/></StoryScript>"#)
            .expect_err("err");
        assert_eq!(err.code, ContentErrorCode::MissingField);
    }

    #[test]
    fn shop_collects_repeated_dialogue_lines_in_order() {
        let db = compile_base(
            r#"<ShopDef><guardKind>storeSlime</guardKind>
                <greetingText>one</greetingText><greetingText>two</greetingText>
                <farewellText>bye</farewellText></ShopDef>"#,
        )
        .expect("compile");
        let shop = db.shop().expect("shop");
        assert_eq!(shop.guard_count, 5);
        assert_eq!(shop.greeting_text, vec!["one".to_string(), "two".to_string()]);
        assert_eq!(shop.farewell_line(3), "bye");
    }

    #[test]
    fn malformed_xml_reports_location() {
        let err = compile_base(r#"<BossDef><defName>a</defName>"#).expect_err("err");
        assert_eq!(err.code, ContentErrorCode::XmlMalformed);
        assert!(err.location.is_some());
    }

    #[test]
    fn same_mod_duplicate_def_errors() {
        let err = compile_base(
            r#"<BossDef><defName>troll</defName></BossDef><BossDef><defName>troll</defName></BossDef>"#,
        )
        .expect_err("err");
        assert_eq!(err.code, ContentErrorCode::DuplicateDefInMod);
    }

    #[test]
    fn unknown_def_type_errors() {
        let err = compile_base(r#"<EntityDef><defName>a</defName></EntityDef>"#).expect_err("err");
        assert_eq!(err.code, ContentErrorCode::UnknownDefType);
    }

    #[test]
    fn cross_mod_duplicate_is_last_mod_wins_and_script_is_replaced() {
        let temp = TempDir::new().expect("temp");
        let app = setup_app_paths(temp.path());
        write_file(
            &app.base_content_dir.join("defs.xml"),
            r#"<Defs><BossDef><defName>troll</defName><label>Base</label></BossDef>
            <StoryScript><entry kind="boss">troll</entry><entry kind="shop"/></StoryScript></Defs>"#,
        );
        write_file(
            &app.mods_dir.join("moda").join("defs.xml"),
            r#"<Defs><BossDef><defName>troll</defName><label>Mod</label></BossDef>
            <StoryScript><entry kind="portal"/></StoryScript></Defs>"#,
        );
        let db = compile_def_database(
            &app,
            &ContentPlanRequest {
                enabled_mods: vec!["moda".to_string()],
            },
        )
        .expect("compile");
        assert_eq!(db.boss_by_name("troll").expect("troll").label, "Mod");
        assert_eq!(db.script(), &[ScriptEntry::Portal]);
    }

    #[test]
    fn missing_enabled_mod_reports_discovery_error() {
        let temp = TempDir::new().expect("temp");
        let app = setup_app_paths(temp.path());
        let err = compile_def_database(
            &app,
            &ContentPlanRequest {
                enabled_mods: vec!["ghost".to_string()],
            },
        )
        .expect_err("err");
        assert_eq!(err.code, ContentErrorCode::Discovery);
        assert_eq!(err.mod_id, "ghost");
    }
}
