//! Minimal block-font text for on-screen messages.

use image::{Rgba, RgbaImage};

const GLYPH_COLS: u32 = 5;
const GLYPH_ROWS: u32 = 5;

fn glyph(c: char) -> [&'static str; 5] {
    match c {
        'A' => [" ### ", "#   #", "#####", "#   #", "#   #"],
        'B' => ["#### ", "#   #", "#### ", "#   #", "#### "],
        'C' => [" ####", "#    ", "#    ", "#    ", " ####"],
        'D' => ["#### ", "#   #", "#   #", "#   #", "#### "],
        'E' => ["#####", "#    ", "#### ", "#    ", "#####"],
        'F' => ["#####", "#    ", "#### ", "#    ", "#    "],
        'G' => [" ####", "#    ", "#  ##", "#   #", " ####"],
        'H' => ["#   #", "#   #", "#####", "#   #", "#   #"],
        'I' => ["#####", "  #  ", "  #  ", "  #  ", "#####"],
        'J' => ["#####", "   # ", "   # ", "#  # ", " ##  "],
        'K' => ["#   #", "#  # ", "###  ", "#  # ", "#   #"],
        'L' => ["#    ", "#    ", "#    ", "#    ", "#####"],
        'M' => ["#   #", "## ##", "# # #", "#   #", "#   #"],
        'N' => ["#   #", "##  #", "# # #", "#  ##", "#   #"],
        'O' => [" ### ", "#   #", "#   #", "#   #", " ### "],
        'P' => ["#### ", "#   #", "#### ", "#    ", "#    "],
        'Q' => [" ### ", "#   #", "# # #", "#  # ", " ## #"],
        'R' => ["#### ", "#   #", "#### ", "#  # ", "#   #"],
        'S' => [" ####", "#    ", " ### ", "    #", "#### "],
        'T' => ["#####", "  #  ", "  #  ", "  #  ", "  #  "],
        'U' => ["#   #", "#   #", "#   #", "#   #", " ### "],
        'V' => ["#   #", "#   #", "#   #", " # # ", "  #  "],
        'W' => ["#   #", "#   #", "# # #", "## ##", "#   #"],
        'X' => ["#   #", " # # ", "  #  ", " # # ", "#   #"],
        'Y' => ["#   #", " # # ", "  #  ", "  #  ", "  #  "],
        'Z' => ["#####", "   # ", "  #  ", " #   ", "#####"],
        '0' => [" ### ", "#  ##", "# # #", "##  #", " ### "],
        '1' => ["  #  ", " ##  ", "  #  ", "  #  ", " ### "],
        '2' => ["#### ", "    #", " ### ", "#    ", "#####"],
        '3' => ["#### ", "    #", " ### ", "    #", "#### "],
        '4' => ["#   #", "#   #", "#####", "    #", "    #"],
        '5' => ["#####", "#    ", "#### ", "    #", "#### "],
        '6' => [" ### ", "#    ", "#### ", "#   #", " ### "],
        '7' => ["#####", "    #", "   # ", "  #  ", "  #  "],
        '8' => [" ### ", "#   #", " ### ", "#   #", " ### "],
        '9' => [" ### ", "#   #", " ####", "    #", " ### "],
        '.' => ["     ", "     ", "     ", "     ", "  #  "],
        ',' => ["     ", "     ", "     ", "  #  ", " #   "],
        ':' => ["     ", "  #  ", "     ", "  #  ", "     "],
        '-' => ["     ", "     ", "#####", "     ", "     "],
        '_' => ["     ", "     ", "     ", "     ", "#####"],
        '/' => ["    #", "   # ", "  #  ", " #   ", "#    "],
        '!' => ["  #  ", "  #  ", "  #  ", "     ", "  #  "],
        '?' => [" ### ", "#   #", "  ## ", "     ", "  #  "],
        '\'' => ["  #  ", "  #  ", "     ", "     ", "     "],
        ' ' => ["     ", "     ", "     ", "     ", "     "],
        _ => ["#####", "#   #", "#   #", "#   #", "#####"],
    }
}

fn draw_char(image: &mut RgbaImage, c: char, x_offset: u32, y_offset: u32, scale: u32, color: Rgba<u8>) {
    for (row, pattern) in glyph(c).iter().enumerate() {
        for (col, ch) in pattern.chars().enumerate() {
            if ch != '#' {
                continue;
            }
            for dy in 0..scale {
                for dx in 0..scale {
                    let px = x_offset + col as u32 * scale + dx;
                    let py = y_offset + row as u32 * scale + dy;
                    if px < image.width() && py < image.height() {
                        image.put_pixel(px, py, color);
                    }
                }
            }
        }
    }
}

/// Horizontal advance of one character, spacing included.
pub fn char_advance(scale: u32) -> u32 {
    (GLYPH_COLS + 1) * scale
}

pub fn line_height(scale: u32) -> u32 {
    (GLYPH_ROWS + 2) * scale
}

pub fn draw_text(image: &mut RgbaImage, text: &str, x: u32, y: u32, scale: u32, color: Rgba<u8>) {
    for (i, c) in text.chars().enumerate() {
        let char_x = x + i as u32 * char_advance(scale);
        draw_char(image, c.to_ascii_uppercase(), char_x, y, scale, color);
    }
}

pub fn wrap_text(text: &str, max_chars_per_line: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current_line = String::new();

    for word in text.split_whitespace() {
        if current_line.is_empty() {
            current_line = word.to_string();
        } else if current_line.len() + 1 + word.len() <= max_chars_per_line {
            current_line.push(' ');
            current_line.push_str(word);
        } else {
            lines.push(std::mem::take(&mut current_line));
            current_line = word.to_string();
        }
    }

    if !current_line.is_empty() {
        lines.push(current_line);
    }

    lines
}

/// Draws `message` centred in a dark band along the bottom of the frame.
pub fn draw_banner(image: &mut RgbaImage, message: &str, scale: u32) {
    let margin = 2 * scale;
    let max_chars = ((image.width().saturating_sub(2 * margin)) / char_advance(scale)).max(1) as usize;
    let lines = wrap_text(message, max_chars);
    if lines.is_empty() {
        return;
    }

    let band_height = (lines.len() as u32 * line_height(scale) + 2 * margin).min(image.height());
    let band_top = image.height() - band_height;
    for y in band_top..image.height() {
        for x in 0..image.width() {
            image.put_pixel(x, y, Rgba([40, 0, 0, 255]));
        }
    }

    let color = Rgba([255, 255, 255, 255]);
    for (index, line) in lines.iter().enumerate() {
        let width = line.chars().count() as u32 * char_advance(scale);
        let x = image.width().saturating_sub(width) / 2;
        let y = band_top + margin + index as u32 * line_height(scale);
        draw_text(image, line, x, y, scale, color);
    }
}
